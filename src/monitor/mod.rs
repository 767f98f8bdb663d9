//! Staleness detection and operator alerting.

mod alerts;
mod staleness;

pub use alerts::{
    Alert, AlertRunSummary, AlertType, Severity, acknowledge_alert, list_open_alerts,
    run_alert_checks,
};
pub use staleness::{StuckJob, find_stuck_jobs, watched_statuses};

use crate::config::MonitorConfig;
use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::time::{self, Duration};

const MIN_INTERVAL_SECONDS: u64 = 10;

/// Periodic alert generator. Runs until the task is dropped.
pub async fn run(pool: SqlitePool, config: MonitorConfig) -> Result<()> {
    let interval_secs = config.interval_secs.max(MIN_INTERVAL_SECONDS);
    let mut interval = time::interval(Duration::from_secs(interval_secs));
    tracing::info!(interval_secs, "monitor loop started");

    loop {
        interval.tick().await;
        run_alert_checks(&pool, &config, Utc::now()).await;
    }
}
