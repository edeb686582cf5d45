#[allow(clippy::module_inception)]
mod engine;
mod integration;
mod message;
pub mod state;

pub use engine::Engine;
pub use engine::SendError;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::CommandRejected;
pub use message::CommandResponder;
pub use message::FireplaceCommand;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use state::FireplaceState;
pub use state::State;
