use std::collections::HashMap;

use tokio::time::Instant;

use super::channel::RawStatus;
use crate::engine::FireplaceCommand;
use crate::engine::FireplaceState;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("power field must be \"1\" or \"0\", got {got:?}")]
    Power { got: String },

    #[error("height field is not an integer: {got:?}")]
    Height { got: String },

    #[error("height {got} outside valid range 1-5")]
    HeightRange { got: u8 },
}

#[derive(Debug)]
struct Entry {
    state: FireplaceState,
    last_poll: Option<Instant>,
}

/// Last-known state per fireplace.
///
/// State only changes through the explicit update calls: a successful poll
/// result, a pushed notification, or a successful command acknowledgement.
/// A malformed update changes nothing, keeping last-known-good. The
/// subsystem never guesses state.
///
/// The store is a pure cache: the caller forwards the returned state to the
/// engine, so no channel send ever happens while the store's lock is held
/// and a backed-up engine cannot stall units sharing the store.
pub struct StateStore {
    entries: HashMap<String, Entry>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Apply a successful poll response.
    ///
    /// Parses the raw wire fields; any malformed field fails the whole update
    /// and the previously cached state stays untouched. Stamps the
    /// last-successful-query time.
    pub fn apply_poll_result(
        &mut self,
        serial: &str,
        raw: &RawStatus,
    ) -> Result<FireplaceState, ParseError> {
        let state = parse_status(raw)?;

        let entry = self.entry(serial);
        entry.state = state.clone();
        entry.last_poll = Some(Instant::now());

        Ok(state)
    }

    /// Apply a server-initiated push.
    ///
    /// Same parse rules as a poll result, but a push is not a query: the
    /// last-successful-query timestamp is left untouched.
    pub fn apply_push(
        &mut self,
        serial: &str,
        raw: &RawStatus,
    ) -> Result<FireplaceState, ParseError> {
        let state = parse_status(raw)?;
        self.entry(serial).state = state.clone();
        Ok(state)
    }

    /// Apply a successful command acknowledgement.
    ///
    /// Optimistically sets exactly the commanded field so the caller sees the
    /// effect immediately; the next poll corrects any divergence. Callers must
    /// only invoke this after the transport reported success.
    pub fn apply_command_ack(
        &mut self,
        serial: &str,
        command: FireplaceCommand,
    ) -> FireplaceState {
        let entry = self.entry(serial);
        match command {
            FireplaceCommand::Power(on) => entry.state.power = on,
            FireplaceCommand::Height(height) => entry.state.height = height,
        }
        entry.state.clone()
    }

    /// Last-known state, if any update has populated it.
    #[allow(dead_code)]
    pub fn last_known(&self, serial: &str) -> Option<&FireplaceState> {
        self.entries.get(serial).map(|e| &e.state)
    }

    /// Time of the last successful poll for a fireplace.
    #[allow(dead_code)]
    pub fn last_poll(&self, serial: &str) -> Option<Instant> {
        self.entries.get(serial).and_then(|e| e.last_poll)
    }

    /// Drop cached state for a removed fireplace.
    pub fn remove(&mut self, serial: &str) {
        self.entries.remove(serial);
    }

    fn entry(&mut self, serial: &str) -> &mut Entry {
        self.entries.entry(serial.to_string()).or_insert_with(|| Entry {
            state: FireplaceState::default(),
            last_poll: None,
        })
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_status(raw: &RawStatus) -> Result<FireplaceState, ParseError> {
    let power = match raw.power.as_str() {
        "1" => true,
        "0" => false,
        other => {
            return Err(ParseError::Power {
                got: other.to_string(),
            })
        }
    };

    let height: u8 = raw.height.parse().map_err(|_| ParseError::Height {
        got: raw.height.clone(),
    })?;
    if !(1..=5).contains(&height) {
        return Err(ParseError::HeightRange { got: height });
    }

    Ok(FireplaceState {
        power,
        height,
        brand: raw.brand.clone(),
        firmware: raw.firmware.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(power: &str, height: &str) -> RawStatus {
        RawStatus {
            power: power.to_string(),
            height: height.to_string(),
            brand: "Hearth and Home".to_string(),
            firmware: "1.0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_poll_result_updates_cache() {
        let mut store = StateStore::new();

        let state = store.apply_poll_result("ABC123", &raw("1", "3")).unwrap();
        assert!(state.power);
        assert_eq!(state.height, 3);
        assert_eq!(store.last_known("ABC123"), Some(&state));
        assert!(store.last_poll("ABC123").is_some());
    }

    #[tokio::test]
    async fn test_malformed_poll_keeps_last_known_good() {
        let mut store = StateStore::new();

        store.apply_poll_result("ABC123", &raw("1", "3")).unwrap();

        let err = store
            .apply_poll_result("ABC123", &raw("1", "abc"))
            .unwrap_err();
        assert!(matches!(err, ParseError::Height { .. }));

        let state = store.last_known("ABC123").unwrap();
        assert!(state.power);
        assert_eq!(state.height, 3);
    }

    #[tokio::test]
    async fn test_parse_rejections() {
        let mut store = StateStore::new();

        let err = store
            .apply_poll_result("ABC123", &raw("2", "3"))
            .unwrap_err();
        assert!(matches!(err, ParseError::Power { .. }));

        let err = store
            .apply_poll_result("ABC123", &raw("0", "9"))
            .unwrap_err();
        assert!(matches!(err, ParseError::HeightRange { got: 9 }));

        assert!(store.last_known("ABC123").is_none());
    }

    #[tokio::test]
    async fn test_push_does_not_stamp_poll_time() {
        let mut store = StateStore::new();

        let state = store.apply_push("ABC123", &raw("1", "5")).unwrap();
        assert!(state.power);
        assert_eq!(state.height, 5);
        assert_eq!(store.last_known("ABC123"), Some(&state));

        // A push is not a query.
        assert!(store.last_poll("ABC123").is_none());

        store.apply_poll_result("ABC123", &raw("0", "1")).unwrap();
        assert!(store.last_poll("ABC123").is_some());
    }

    #[tokio::test]
    async fn test_command_ack_is_optimistic_and_partial() {
        let mut store = StateStore::new();

        store.apply_poll_result("ABC123", &raw("0", "2")).unwrap();

        let state = store.apply_command_ack("ABC123", FireplaceCommand::Power(true));
        assert!(state.power);
        // Only the commanded field changes.
        assert_eq!(state.height, 2);
        assert_eq!(state.brand, "Hearth and Home");

        // An ack is not a query either, and a fresh device gets a
        // default-based entry.
        let state = store.apply_command_ack("NEW999", FireplaceCommand::Height(4));
        assert_eq!(state.height, 4);
        assert!(!state.power);
        assert!(store.last_poll("NEW999").is_none());
    }

    #[tokio::test]
    async fn test_remove_clears_entry() {
        let mut store = StateStore::new();
        store.apply_poll_result("ABC123", &raw("1", "1")).unwrap();
        store.remove("ABC123");
        assert!(store.last_known("ABC123").is_none());
    }
}
