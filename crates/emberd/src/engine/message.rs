//! Type-safe message system for emberd
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use tokio::sync::oneshot;

use super::state::FireplaceState;

/// A control command for a single fireplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireplaceCommand {
    /// Turn the flame on or off.
    Power(bool),

    /// Set the flame height (1-5).
    Height(u8),
}

/// Rejection reason reported back to the command originator.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CommandRejected(pub String);

/// Responder for command results, so callers can observe failure instead of
/// fire-and-forget. A dropped sender means the owning unit went away.
pub type CommandResponder = oneshot::Sender<Result<(), CommandRejected>>;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug)]
pub enum FromIntegrationMessage {
    /// A fireplace was discovered and registered
    FireplaceDiscovered {
        serial: String,
        name: String,
        integration_name: String,
    },

    /// A fireplace was removed (deregistered account-side, etc.)
    FireplaceRemoved { serial: String },

    /// A fireplace's state changed (poll result or command acknowledgement)
    FireplaceStateChanged {
        serial: String,
        state: FireplaceState,
    },
}

/// Messages FROM the engine TO integrations (commands)
pub enum ToIntegrationMessage {
    /// Command to change a fireplace's state
    FireplaceCommand {
        serial: String,
        command: FireplaceCommand,
        respond_to: CommandResponder,
    },

    /// Force a live state query, bypassing the poll schedule
    FireplaceRefresh { serial: String },
}

impl std::fmt::Debug for ToIntegrationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToIntegrationMessage::FireplaceCommand {
                serial, command, ..
            } => f
                .debug_struct("FireplaceCommand")
                .field("serial", serial)
                .field("command", command)
                .field("respond_to", &"<oneshot>")
                .finish(),
            ToIntegrationMessage::FireplaceRefresh { serial } => f
                .debug_struct("FireplaceRefresh")
                .field("serial", serial)
                .finish(),
        }
    }
}
