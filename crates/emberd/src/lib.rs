pub mod api;
pub mod config;
mod engine;
mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::FireplaceCommand;
pub use engine::FireplaceState;
pub use engine::SendError;
pub use engine::State;
