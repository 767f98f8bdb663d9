mod agent;
mod core;
mod gateway;
mod monitor;
mod observability;
mod payments;

pub use agent::AgentConfig;
pub use self::core::{Config, DatabaseConfig};
pub use gateway::GatewayConfig;
pub use monitor::{MonitorConfig, StalenessThresholds};
pub use observability::ObservabilityConfig;
pub use payments::PaymentsConfig;
