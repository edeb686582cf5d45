use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::CommandRejected;
use super::message::FireplaceCommand;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::State;
use crate::engine::IntegrationContext;

/// emberd engine
///
/// This structure handles the flow of events from integrations, routing
/// commands to the integration that owns each fireplace, and maintaining a
/// view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of fireplace serial -> integration name for routing commands
    routing_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: HashMap<String, ToIntegrationSender>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: Vec<JoinHandle<()>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

/// Error returned when a command could not be delivered or was rejected.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("no fireplace with serial {0}")]
    UnknownSerial(String),

    #[error("integration '{0}' is not running")]
    IntegrationGone(String),

    #[error("integration dropped the command before answering")]
    Dropped,

    #[error(transparent)]
    Rejected(#[from] CommandRejected),
}

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            routing_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: HashMap::new(),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: Vec::new(),
        }
    }

    /// Register integrations from configuration
    ///
    /// This is a convenience method that checks the config and registers
    /// any enabled integrations.
    pub fn register_integrations_from_config(&mut self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        self.integration_channels
            .insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles.push(handle);
    }

    /// Send a command to the integration owning a fireplace and wait for the
    /// result.
    ///
    /// The command resets the device's poll timer and, on success, updates
    /// cached state optimistically ahead of the next poll.
    pub async fn send_fireplace_command(
        &self,
        serial: &str,
        command: FireplaceCommand,
    ) -> Result<(), SendError> {
        let (respond_to, response) = oneshot::channel();
        let msg = ToIntegrationMessage::FireplaceCommand {
            serial: serial.to_string(),
            command,
            respond_to,
        };
        self.route_to_owner(serial, msg)?;

        match response.await {
            Ok(result) => result.map_err(SendError::from),
            Err(_) => Err(SendError::Dropped),
        }
    }

    /// Request a live state query for a fireplace, bypassing its schedule.
    pub fn request_refresh(&self, serial: &str) -> Result<(), SendError> {
        self.route_to_owner(
            serial,
            ToIntegrationMessage::FireplaceRefresh {
                serial: serial.to_string(),
            },
        )
    }

    /// Route a message to the integration that owns the given serial.
    fn route_to_owner(&self, serial: &str, msg: ToIntegrationMessage) -> Result<(), SendError> {
        let integration_name = {
            let map = self
                .routing_map
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            map.get(serial)
                .cloned()
                .ok_or_else(|| SendError::UnknownSerial(serial.to_string()))?
        };

        let tx = self
            .integration_channels
            .get(&integration_name)
            .ok_or_else(|| SendError::IntegrationGone(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| SendError::IntegrationGone(integration_name))
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::FireplaceDiscovered {
                serial,
                name,
                integration_name,
            } => {
                info!(
                    "Fireplace discovered: {} '{}' (from {})",
                    serial, name, integration_name
                );

                // Record which integration owns this fireplace for command
                // routing. State is not populated until the first state-change
                // message arrives.
                if let Ok(mut map) = self.routing_map.lock() {
                    map.insert(serial, integration_name);
                }
            }
            FromIntegrationMessage::FireplaceRemoved { serial } => {
                info!("Fireplace removed: {}", serial);

                {
                    let mut state = State::clone(&self.state.load());
                    state.fireplaces.remove(&serial);
                    self.state.store(Arc::new(state));
                }

                // Remove from routing map
                if let Ok(mut map) = self.routing_map.lock() {
                    map.remove(&serial);
                }
            }
            FromIntegrationMessage::FireplaceStateChanged { serial, state } => {
                info!(
                    "Fireplace state changed: {} -> power={}, height={}",
                    serial, state.power, state.height
                );

                let mut snapshot = State::clone(&self.state.load());
                snapshot.fireplaces.insert(serial, state);
                self.state.store(Arc::new(snapshot));
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
