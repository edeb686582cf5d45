use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;
use tracing::warn;

use super::channel::CommandChannel;
use super::client::HttpClient;
use super::poll::PollInterval;
use super::poll::PollSchedule;
use super::registry::DeviceRegistry;
use super::registry::Fireplace;
use super::registry::ReconcileDelta;
use super::registry::reconcile;
use super::session::Session;
use super::session::SessionManager;
use super::store::StateStore;
use super::unit::FireplaceUnit;
use super::unit::SharedStateStore;
use super::unit::UnitHandle;
use super::unit::UnitMessage;
use crate::config::IntellifireConfig;
use crate::engine::CommandRejected;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// Intellifire integration for emberd
///
/// Authenticates against the vendor cloud once at startup, discovers the
/// account's fireplaces, and runs one polling/command unit per device. The
/// session is written here once and shared read-only with every unit.
pub struct IntellifireIntegration<C: HttpClient + 'static> {
    name: String,
    config: IntellifireConfig,
    client: Arc<C>,
    session: Option<Arc<Session>>,
    devices: HashMap<String, Arc<Fireplace>>,
    units: HashMap<String, UnitHandle>,
    store: Option<SharedStateStore>,
}

impl<C: HttpClient + 'static> IntellifireIntegration<C> {
    pub fn new(client: C, config: &IntellifireConfig) -> Self {
        Self {
            name: "intellifire".to_string(),
            config: config.clone(),
            client: Arc::new(client),
            session: None,
            devices: HashMap::new(),
            units: HashMap::new(),
            store: None,
        }
    }

    /// Apply a reconcile delta: spawn units for additions, stop units for
    /// removals, and report both to the engine.
    async fn apply_delta(&mut self, delta: ReconcileDelta, tx: &FromIntegrationSender) {
        let session = match &self.session {
            Some(s) => s.clone(),
            None => return,
        };
        let store = match &self.store {
            Some(s) => s.clone(),
            None => return,
        };

        for serial in delta.to_remove {
            if let Some(unit) = self.units.remove(&serial) {
                unit.stop();
            }
            self.devices.remove(&serial);
            store.lock().await.remove(&serial);
            let _ = tx
                .send(FromIntegrationMessage::FireplaceRemoved {
                    serial: serial.clone(),
                })
                .await;
        }

        let interval = PollInterval::from_config(self.config.poll_interval());
        for fireplace in delta.to_add {
            let device = Arc::new(fireplace);
            info!(
                "Registering fireplace '{}' with serial {}",
                device.name, device.serial
            );

            let channel = CommandChannel::new(
                self.client.clone(),
                session.clone(),
                self.config.base_url.clone(),
                device.clone(),
            );
            let unit = FireplaceUnit::spawn(
                device.clone(),
                channel,
                PollSchedule::new(interval),
                store.clone(),
                tx.clone(),
            );

            let _ = tx
                .send(FromIntegrationMessage::FireplaceDiscovered {
                    serial: device.serial.clone(),
                    name: device.name.clone(),
                    integration_name: self.name.clone(),
                })
                .await;

            self.units.insert(device.serial.clone(), unit);
            self.devices.insert(device.serial.clone(), device);
        }
    }

    fn forward(&self, serial: &str, msg: UnitMessage) -> Result<(), CommandRejected> {
        match self.units.get(serial) {
            Some(unit) => {
                if unit.send(msg) {
                    Ok(())
                } else {
                    Err(CommandRejected(format!(
                        "unit for fireplace {} has stopped",
                        serial
                    )))
                }
            }
            None => Err(CommandRejected(format!("unknown fireplace {}", serial))),
        }
    }
}

#[async_trait]
impl<C: HttpClient + 'static> Integration for IntellifireIntegration<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        let manager = SessionManager::new(self.client.clone(), self.config.base_url.clone());
        let session = manager
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;
        self.session = Some(Arc::new(session));
        self.store = Some(Arc::new(Mutex::new(StateStore::new())));

        let registry = DeviceRegistry::new(
            self.client.clone(),
            self.config.base_url.clone(),
            self.config.local.clone(),
        );
        let discovered = registry
            .discover()
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;

        let delta = reconcile(&self.devices, discovered);
        self.apply_delta(delta, &tx).await;

        info!(
            "[{}] Setup complete with {} fireplace(s)",
            self.name,
            self.units.len()
        );
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::FireplaceCommand {
                serial,
                command,
                respond_to,
            } => {
                // Rejections go to the responder, not up the integration task.
                if let Err(rejection) =
                    self.forward(&serial, UnitMessage::Command(command, respond_to))
                {
                    warn!("[{}] {}", self.name, rejection);
                }
            }
            ToIntegrationMessage::FireplaceRefresh { serial } => {
                if let Err(rejection) = self.forward(&serial, UnitMessage::Refresh) {
                    warn!("[{}] {}", self.name, rejection);
                }
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("[{}] Shutting down", self.name);
        for (_, unit) in self.units.drain() {
            unit.stop();
        }
        self.devices.clear();
        Ok(())
    }
}
