use crate::config::StalenessThresholds;
use crate::jobs::JobStatus;
use crate::store::{format_ts, parse_ts};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// A job that has sat in one status longer than that status allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StuckJob {
    pub job_id: String,
    pub user_id: String,
    pub service_id: String,
    pub status: JobStatus,
    pub status_updated_at: DateTime<Utc>,
    pub minutes_stuck: i64,
}

/// Statuses under watch with their limits in minutes. Everything else,
/// `pending` included, is never reported.
pub fn watched_statuses(thresholds: &StalenessThresholds) -> [(JobStatus, i64); 4] {
    [
        (JobStatus::Dispatched, thresholds.dispatched),
        (JobStatus::Active, thresholds.active),
        (JobStatus::AwaitingOtp, thresholds.awaiting_otp),
        (JobStatus::OutreachSent, thresholds.outreach_sent),
    ]
}

/// Jobs past their status threshold, most stale first.
pub async fn find_stuck_jobs(
    pool: &SqlitePool,
    thresholds: &StalenessThresholds,
    now: DateTime<Utc>,
) -> Result<Vec<StuckJob>, sqlx::Error> {
    let mut stuck = Vec::new();
    for (status, minutes) in watched_statuses(thresholds) {
        let Some(cutoff) = ChronoDuration::try_minutes(minutes)
            .and_then(|limit| now.checked_sub_signed(limit))
        else {
            tracing::warn!(
                status = %status,
                threshold_minutes = minutes,
                "staleness threshold out of range, status skipped"
            );
            continue;
        };
        let rows = sqlx::query(
            "SELECT id, user_id, service_id, status_updated_at
             FROM jobs
             WHERE status = ? AND status_updated_at < ?",
        )
        .bind(status.as_db())
        .bind(format_ts(cutoff))
        .fetch_all(pool)
        .await?;

        for row in rows {
            let updated_at = parse_ts(&row.get::<String, _>("status_updated_at"))?;
            stuck.push(StuckJob {
                job_id: row.get("id"),
                user_id: row.get("user_id"),
                service_id: row.get("service_id"),
                status,
                status_updated_at: updated_at,
                minutes_stuck: (now - updated_at).num_minutes(),
            });
        }
    }
    stuck.sort_by(|a, b| a.status_updated_at.cmp(&b.status_updated_at));
    Ok(stuck)
}
