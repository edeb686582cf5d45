use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::client::HttpClient;
use super::client::HttpError;

/// A discovered fireplace.
///
/// Immutable after discovery; device units hold an `Arc` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fireplace {
    /// Stable unique identifier
    pub serial: String,

    /// Display name from the cloud account
    pub name: String,

    /// Per-device secret, hex-decoded at discovery. Only ever used as key
    /// material for local challenge-response signing, never sent in clear.
    pub api_key: Vec<u8>,

    /// Local network address; presence selects the local transport path
    pub local_addr: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Transport(#[from] HttpError),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("malformed enumeration payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("account has no locations")]
    NoLocations,

    #[error("fireplace {serial} has a malformed api key")]
    BadApiKey {
        serial: String,
        #[source]
        source: hex::FromHexError,
    },
}

#[derive(Deserialize)]
struct LocationList {
    locations: Vec<LocationEntry>,
}

#[derive(Deserialize)]
struct LocationEntry {
    location_id: String,
}

#[derive(Deserialize)]
struct FireplaceList {
    fireplaces: Vec<FireplaceEntry>,
}

#[derive(Deserialize)]
struct FireplaceEntry {
    name: String,
    serial: String,
    apikey: String,
}

/// Delta produced by reconciling discovery output against known devices.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileDelta {
    pub to_add: Vec<Fireplace>,
    pub to_remove: Vec<String>,
}

impl ReconcileDelta {
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Discovers fireplaces under the authenticated account.
pub struct DeviceRegistry<C: HttpClient> {
    client: Arc<C>,
    base_url: String,
    local_addrs: HashMap<String, String>,
}

impl<C: HttpClient> DeviceRegistry<C> {
    pub fn new(client: Arc<C>, base_url: String, local_addrs: HashMap<String, String>) -> Self {
        Self {
            client,
            base_url,
            local_addrs,
        }
    }

    /// Two-stage cloud lookup: enumerate locations, then enumerate the
    /// fireplaces of the first location. The session cookie set at login
    /// authenticates both calls through the client's cookie store.
    pub async fn discover(&self) -> Result<Vec<Fireplace>, DiscoveryError> {
        let url = format!("{}/enumlocations", self.base_url);
        let response = self.client.get(&url).await?;
        if !response.is_success() {
            return Err(DiscoveryError::Status {
                url,
                status: response.status,
            });
        }

        let locations: LocationList = serde_json::from_str(&response.body)?;
        let location_id = locations
            .locations
            .first()
            .map(|l| l.location_id.clone())
            .ok_or(DiscoveryError::NoLocations)?;

        let url = format!("{}/enumfireplaces?location_id={}", self.base_url, location_id);
        let response = self.client.get(&url).await?;
        if !response.is_success() {
            return Err(DiscoveryError::Status {
                url,
                status: response.status,
            });
        }

        let list: FireplaceList = serde_json::from_str(&response.body)?;
        let mut fireplaces = Vec::with_capacity(list.fireplaces.len());
        for entry in list.fireplaces {
            let api_key = hex::decode(&entry.apikey).map_err(|e| DiscoveryError::BadApiKey {
                serial: entry.serial.clone(),
                source: e,
            })?;
            let local_addr = self.local_addrs.get(&entry.serial).cloned();

            debug!(
                "Discovered fireplace '{}' with serial {} (local: {})",
                entry.name,
                entry.serial,
                local_addr.is_some()
            );
            fireplaces.push(Fireplace {
                serial: entry.serial,
                name: entry.name,
                api_key,
                local_addr,
            });
        }

        Ok(fireplaces)
    }
}

/// Reconcile discovered fireplaces against the known set, keyed by serial.
///
/// Discovered serials not yet known are additions. Known devices that lack
/// identity fields (empty serial or empty api key) are flagged for removal.
/// Running an unchanged discovery twice yields an empty delta.
pub fn reconcile(
    known: &HashMap<String, Arc<Fireplace>>,
    discovered: Vec<Fireplace>,
) -> ReconcileDelta {
    let mut delta = ReconcileDelta::default();

    for fireplace in discovered {
        if !known.contains_key(&fireplace.serial) {
            delta.to_add.push(fireplace);
        }
    }

    for (serial, fireplace) in known {
        if fireplace.serial.is_empty() || fireplace.api_key.is_empty() {
            delta.to_remove.push(serial.clone());
        }
    }

    delta
}
