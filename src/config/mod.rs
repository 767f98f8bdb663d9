pub mod schema;

pub use schema::{
    AgentConfig, Config, DatabaseConfig, GatewayConfig, MonitorConfig, ObservabilityConfig,
    PaymentsConfig, StalenessThresholds,
};
