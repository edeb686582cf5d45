use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use super::channel::CommandChannel;
use super::channel::RawStatus;
use super::client::HttpClient;
use super::poll::PollSchedule;
use super::registry::Fireplace;
use super::store::ParseError;
use super::store::StateStore;
use crate::engine::CommandRejected;
use crate::engine::CommandResponder;
use crate::engine::FireplaceCommand;
use crate::engine::FireplaceState;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;

/// State store shared between all device units of an integration
pub type SharedStateStore = Arc<Mutex<StateStore>>;

/// Work items for a single device unit
pub enum UnitMessage {
    /// Execute a command and answer the responder with the outcome
    Command(FireplaceCommand, CommandResponder),

    /// Force a live query now
    Refresh,

    /// Server-initiated state push: update the cache directly without a
    /// redundant query
    Push(RawStatus),
}

/// Handle to a running device unit
pub struct UnitHandle {
    tx: mpsc::UnboundedSender<UnitMessage>,
    task: JoinHandle<()>,
}

impl UnitHandle {
    /// Forward a work item; false if the unit has stopped.
    pub fn send(&self, msg: UnitMessage) -> bool {
        self.tx.send(msg).is_ok()
    }

    /// Stop the unit's task. An in-flight request is simply discarded; nothing
    /// remains to apply its response.
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Per-device polling and command unit.
///
/// One unit per fireplace, each with its own independent timer; timers for
/// different devices never synchronize. Every externally-triggered operation
/// (command, refresh, push) resets the timer before the operation runs, so a
/// manual operation is not followed by a near-duplicate automatic query.
///
/// Concurrent operations on the same device are not mutually excluded; the
/// last response applied to the store wins. The store lock is only held for
/// the cache update itself; the engine notification is sent afterwards.
pub struct FireplaceUnit<C: HttpClient> {
    device: Arc<Fireplace>,
    channel: CommandChannel<C>,
    schedule: PollSchedule,
    store: SharedStateStore,
    to_engine: FromIntegrationSender,
    rx: mpsc::UnboundedReceiver<UnitMessage>,
}

impl<C: HttpClient + 'static> FireplaceUnit<C> {
    pub fn spawn(
        device: Arc<Fireplace>,
        channel: CommandChannel<C>,
        schedule: PollSchedule,
        store: SharedStateStore,
        to_engine: FromIntegrationSender,
    ) -> UnitHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let unit = Self {
            device,
            channel,
            schedule,
            store,
            to_engine,
            rx,
        };
        let task = tokio::spawn(unit.run());
        UnitHandle { tx, task }
    }

    async fn run(mut self) {
        debug!("Unit for {} started", self.device.serial);
        loop {
            tokio::select! {
                _ = self.schedule.tick() => {
                    self.poll_once().await;
                }
                msg = self.rx.recv() => match msg {
                    Some(UnitMessage::Command(command, respond_to)) => {
                        self.schedule.reset();
                        self.execute(command, respond_to).await;
                    }
                    Some(UnitMessage::Refresh) => {
                        self.schedule.reset();
                        self.poll_once().await;
                    }
                    Some(UnitMessage::Push(raw)) => {
                        self.schedule.reset();
                        let applied = self.store.lock().await.apply_push(&self.device.serial, &raw);
                        self.report(applied).await;
                    }
                    None => break,
                }
            }
        }
        debug!("Unit for {} stopped", self.device.serial);
    }

    /// Query the device and apply the result. Failures leave the previous
    /// state intact: the caller sees "unchanged", never a guessed state.
    async fn poll_once(&mut self) {
        match self.channel.poll().await {
            Ok(raw) => {
                let applied = self
                    .store
                    .lock()
                    .await
                    .apply_poll_result(&self.device.serial, &raw);
                self.report(applied).await;
            }
            Err(e) => warn!(
                "Poll failed for {}, keeping last known state: {}",
                self.device.serial, e
            ),
        }
    }

    async fn execute(&mut self, command: FireplaceCommand, respond_to: CommandResponder) {
        match self.channel.execute(command).await {
            Ok(()) => {
                let state = self
                    .store
                    .lock()
                    .await
                    .apply_command_ack(&self.device.serial, command);
                self.notify(state).await;
                let _ = respond_to.send(Ok(()));
            }
            Err(e) => {
                warn!("Command failed for {}: {}", self.device.serial, e);
                // A failed command never touches cached state.
                let _ = respond_to.send(Err(CommandRejected(e.to_string())));
            }
        }
    }

    async fn report(&self, applied: Result<FireplaceState, ParseError>) {
        match applied {
            Ok(state) => self.notify(state).await,
            Err(e) => warn!(
                "Discarding malformed state for {}: {}",
                self.device.serial, e
            ),
        }
    }

    async fn notify(&self, state: FireplaceState) {
        let msg = FromIntegrationMessage::FireplaceStateChanged {
            serial: self.device.serial.clone(),
            state,
        };
        if self.to_engine.send(msg).await.is_err() {
            warn!(
                "Engine receiver gone, dropping state change for {}",
                self.device.serial
            );
        }
    }
}
