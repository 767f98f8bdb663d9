use super::super::{AgentConfig, GatewayConfig, MonitorConfig, ObservabilityConfig, PaymentsConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; relative paths resolve against the workspace directory.
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> String {
    "subrelay.db".into()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.agent.validate().context("invalid [agent] section")?;
        self.monitor.validate().context("invalid [monitor] section")?;
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be greater than zero");
        }
        Ok(())
    }

    /// Absolute path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        let raw = PathBuf::from(&self.database.path);
        if raw.is_absolute() {
            raw
        } else {
            self.workspace_dir.join(raw)
        }
    }
}
