use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// State of a fireplace entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FireplaceState {
    /// Whether the flame is lit.
    pub power: bool,

    /// Flame height (1-5). Zero until the first successful poll or command.
    pub height: u8,

    /// Brand string as reported by the device.
    pub brand: String,

    /// Firmware version string as reported by the device.
    pub firmware: String,
}

/// Centralized snapshot of the entire engine state.
///
/// Readers receive this as an immutable `Arc`; the engine swaps in a new
/// snapshot on every state change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    /// Fireplace state keyed by device serial.
    pub fireplaces: HashMap<String, FireplaceState>,
}
