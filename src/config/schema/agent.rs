use serde::{Deserialize, Serialize};

/// Settings for the HMAC protocol the automation agent uses to call back in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Pre-shared HMAC secret. Agent routes reject every request while unset.
    #[serde(default)]
    pub shared_secret: Option<String>,
    /// Maximum allowed |now - timestamp| in seconds.
    #[serde(default = "default_timestamp_window_secs")]
    pub timestamp_window_secs: u64,
    #[serde(default = "default_nonce_ttl_secs")]
    pub nonce_ttl_secs: u64,
    /// Hard ceiling on remembered nonces. New nonces are refused once reached.
    #[serde(default = "default_nonce_capacity")]
    pub nonce_capacity: usize,
    /// Requests allowed per caller IP within one window.
    #[serde(default = "default_rate_limit_per_window")]
    pub rate_limit_per_window: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

fn default_timestamp_window_secs() -> u64 {
    60
}

fn default_nonce_ttl_secs() -> u64 {
    120
}

fn default_nonce_capacity() -> usize {
    100_000
}

fn default_rate_limit_per_window() -> u32 {
    120
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

impl AgentConfig {
    pub(super) fn validate(&self) -> anyhow::Result<()> {
        if self.timestamp_window_secs == 0 {
            anyhow::bail!("agent.timestamp_window_secs must be greater than zero");
        }
        if self.nonce_ttl_secs < self.timestamp_window_secs {
            anyhow::bail!(
                "agent.nonce_ttl_secs ({}) must not be shorter than agent.timestamp_window_secs ({})",
                self.nonce_ttl_secs,
                self.timestamp_window_secs
            );
        }
        if self.nonce_capacity == 0 {
            anyhow::bail!("agent.nonce_capacity must be greater than zero");
        }
        if self.rate_limit_window_secs == 0 {
            anyhow::bail!("agent.rate_limit_window_secs must be greater than zero");
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            shared_secret: None,
            timestamp_window_secs: default_timestamp_window_secs(),
            nonce_ttl_secs: default_nonce_ttl_secs(),
            nonce_capacity: default_nonce_capacity(),
            rate_limit_per_window: default_rate_limit_per_window(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}
