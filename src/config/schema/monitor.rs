use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Run the alert generator inside the daemon (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between alert-generator runs (default: 300)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Maximum number of active users the agent fleet can serve.
    #[serde(default = "default_user_capacity")]
    pub user_capacity: u64,
    /// Fraction of `user_capacity` above which a capacity warning is raised.
    #[serde(default = "default_capacity_warning_ratio")]
    pub capacity_warning_ratio: f64,
    /// Aggregate outstanding user debt (sats) above which a debt warning is raised.
    #[serde(default = "default_debt_warning_threshold_sats")]
    pub debt_warning_threshold_sats: i64,
    #[serde(default)]
    pub staleness: StalenessThresholds,
}

/// Minutes a job may sit in a status before it is reported stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessThresholds {
    #[serde(default = "default_dispatched_minutes")]
    pub dispatched: i64,
    #[serde(default = "default_active_minutes")]
    pub active: i64,
    #[serde(default = "default_awaiting_otp_minutes")]
    pub awaiting_otp: i64,
    #[serde(default = "default_outreach_sent_minutes")]
    pub outreach_sent: i64,
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    300
}

fn default_user_capacity() -> u64 {
    1000
}

fn default_capacity_warning_ratio() -> f64 {
    0.9
}

fn default_debt_warning_threshold_sats() -> i64 {
    100_000
}

fn default_dispatched_minutes() -> i64 {
    120
}

fn default_active_minutes() -> i64 {
    30
}

fn default_awaiting_otp_minutes() -> i64 {
    20
}

fn default_outreach_sent_minutes() -> i64 {
    3 * 24 * 60
}

/// One year.
const MAX_STALENESS_MINUTES: i64 = 365 * 24 * 60;

impl MonitorConfig {
    pub(super) fn validate(&self) -> anyhow::Result<()> {
        if !(self.capacity_warning_ratio > 0.0 && self.capacity_warning_ratio <= 1.0) {
            anyhow::bail!(
                "monitor.capacity_warning_ratio must be within (0, 1], got {}",
                self.capacity_warning_ratio
            );
        }
        let s = &self.staleness;
        if [s.dispatched, s.active, s.awaiting_otp, s.outreach_sent]
            .iter()
            .any(|minutes| !(1..=MAX_STALENESS_MINUTES).contains(minutes))
        {
            anyhow::bail!(
                "monitor.staleness thresholds must be between 1 and {MAX_STALENESS_MINUTES} minutes"
            );
        }
        Ok(())
    }

    /// Active-user count above which the capacity warning fires.
    pub fn capacity_warning_level(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let capacity = self.user_capacity as f64;
        capacity * self.capacity_warning_ratio
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_interval_secs(),
            user_capacity: default_user_capacity(),
            capacity_warning_ratio: default_capacity_warning_ratio(),
            debt_warning_threshold_sats: default_debt_warning_threshold_sats(),
            staleness: StalenessThresholds::default(),
        }
    }
}

impl Default for StalenessThresholds {
    fn default() -> Self {
        Self {
            dispatched: default_dispatched_minutes(),
            active: default_active_minutes(),
            awaiting_otp: default_awaiting_otp_minutes(),
            outreach_sent: default_outreach_sent_minutes(),
        }
    }
}
