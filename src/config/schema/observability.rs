use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// "error" | "warn" | "info" | "debug" | "trace"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl ObservabilityConfig {
    /// Parsed max level for the fmt subscriber; unknown values fall back to `INFO`.
    pub fn max_level(&self) -> Level {
        self.log_level.trim().parse().unwrap_or(Level::INFO)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}
