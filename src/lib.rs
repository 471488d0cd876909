pub mod collectors;
pub mod config;
pub mod metrics;
pub mod plugin;
pub mod privilege;
pub mod resolver;
pub mod state;

pub use config::Config;
pub use state::Telemetry;
