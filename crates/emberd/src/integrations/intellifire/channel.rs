use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::client::HttpClient;
use super::client::HttpError;
use super::registry::Fireplace;
use super::session::AuthError;
use super::session::Session;
use super::signing;
use crate::engine::FireplaceCommand;

/// The step of a command round-trip that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStep {
    /// State query (cloud apppoll or local /poll)
    Poll,

    /// Cloud command form-post
    CloudPost,

    /// Local challenge fetch
    Challenge,

    /// Local signed command post
    LocalPost,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("transport failure during {step:?}: {source}")]
    Transport {
        step: CommandStep,
        #[source]
        source: HttpError,
    },

    #[error("unexpected status {status} during {step:?}")]
    Status { step: CommandStep, status: u16 },

    #[error("cloud session rejected during {step:?}: {source}")]
    Auth {
        step: CommandStep,
        #[source]
        source: AuthError,
    },

    #[error("malformed body during {step:?}: {source}")]
    Body {
        step: CommandStep,
        #[source]
        source: serde_json::Error,
    },

    #[error("device returned a non-hex challenge nonce: {source}")]
    Nonce {
        #[source]
        source: hex::FromHexError,
    },
}

/// Raw state fields as both transports report them.
///
/// Values stay as wire strings here; parsing and range checks happen when the
/// result is applied to the state store.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStatus {
    pub power: String,
    pub height: String,

    #[serde(default)]
    pub brand: String,

    #[serde(default, rename = "firmware_version_string")]
    pub firmware: String,
}

/// Wire encoding of a command: field name and value string.
///
/// The local path signs exactly `"{name}={value}"`, so this mapping is shared
/// by both transports to keep the signed payload and the posted fields equal.
fn wire(command: FireplaceCommand) -> (&'static str, String) {
    match command {
        FireplaceCommand::Power(on) => ("power", if on { "1" } else { "0" }.to_string()),
        FireplaceCommand::Height(h) => ("height", h.to_string()),
    }
}

/// A 401/403 on the cloud path means the session cookie was not accepted;
/// anything else is a plain status failure. The local path never carries a
/// session, so its statuses always map to `Status`.
fn cloud_status_error(step: CommandStep, status: u16) -> CommandError {
    match status {
        401 | 403 => CommandError::Auth {
            step,
            source: AuthError::Rejected { status },
        },
        _ => CommandError::Status { step, status },
    }
}

/// Executes queries and commands for one fireplace over its transport path.
///
/// Path selection is fixed at construction: a device with a local address is
/// driven over the local challenge-response protocol, everything else goes
/// through the cloud with the session cookie. No retries happen here; the
/// caller owns retry policy.
pub struct CommandChannel<C: HttpClient> {
    client: Arc<C>,
    session: Arc<Session>,
    base_url: String,
    device: Arc<Fireplace>,
}

impl<C: HttpClient> CommandChannel<C> {
    pub fn new(
        client: Arc<C>,
        session: Arc<Session>,
        base_url: String,
        device: Arc<Fireplace>,
    ) -> Self {
        Self {
            client,
            session,
            base_url,
            device,
        }
    }

    /// Query the device's current state.
    pub async fn poll(&self) -> Result<RawStatus, CommandError> {
        let (url, cloud) = match &self.device.local_addr {
            Some(addr) => (format!("http://{}/poll", addr), false),
            None => (
                format!("{}/{}/apppoll", self.base_url, self.device.serial),
                true,
            ),
        };

        let response = self
            .client
            .get(&url)
            .await
            .map_err(|source| CommandError::Transport {
                step: CommandStep::Poll,
                source,
            })?;
        if !response.is_success() {
            return Err(if cloud {
                cloud_status_error(CommandStep::Poll, response.status)
            } else {
                CommandError::Status {
                    step: CommandStep::Poll,
                    status: response.status,
                }
            });
        }

        serde_json::from_str(&response.body).map_err(|source| CommandError::Body {
            step: CommandStep::Poll,
            source,
        })
    }

    /// Send a control command over the device's transport path.
    pub async fn execute(&self, command: FireplaceCommand) -> Result<(), CommandError> {
        match &self.device.local_addr {
            Some(addr) => self.execute_local(addr, command).await,
            None => self.execute_cloud(command).await,
        }
    }

    async fn execute_cloud(&self, command: FireplaceCommand) -> Result<(), CommandError> {
        let (name, value) = wire(command);
        let url = format!("{}/{}/apppost", self.base_url, self.device.serial);
        debug!("Cloud command for {}: {}={}", self.device.serial, name, value);

        let form = vec![(name.to_string(), value)];
        let response = self
            .client
            .post_form(&url, &form)
            .await
            .map_err(|source| CommandError::Transport {
                step: CommandStep::CloudPost,
                source,
            })?;

        // Success is any successful status; the body carries no ack to parse.
        if !response.is_success() {
            return Err(cloud_status_error(CommandStep::CloudPost, response.status));
        }
        Ok(())
    }

    async fn execute_local(
        &self,
        addr: &str,
        command: FireplaceCommand,
    ) -> Result<(), CommandError> {
        let (name, value) = wire(command);

        let url = format!("http://{}/get_challenge", addr);
        let response = self
            .client
            .get(&url)
            .await
            .map_err(|source| CommandError::Transport {
                step: CommandStep::Challenge,
                source,
            })?;
        if !response.is_success() {
            return Err(CommandError::Status {
                step: CommandStep::Challenge,
                status: response.status,
            });
        }
        let challenge = response.body;

        let signed = signing::sign_command(&self.device.api_key, &challenge, name, &value)
            .map_err(|source| CommandError::Nonce { source })?;
        debug!(
            "Local command for {}: {}={} (challenge {})",
            self.device.serial,
            name,
            value,
            challenge.trim()
        );

        let url = format!("http://{}/post", addr);
        let form = vec![
            ("command".to_string(), name.to_string()),
            ("value".to_string(), value),
            ("user".to_string(), self.session.user_id.clone()),
            ("response".to_string(), signed),
        ];
        let response = self
            .client
            .post_form(&url, &form)
            .await
            .map_err(|source| CommandError::Transport {
                step: CommandStep::LocalPost,
                source,
            })?;
        if !response.is_success() {
            return Err(CommandError::Status {
                step: CommandStep::LocalPost,
                status: response.status,
            });
        }
        Ok(())
    }
}
