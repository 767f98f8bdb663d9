use super::staleness::find_stuck_jobs;
use crate::config::MonitorConfig;
use crate::store::{active_user_count, format_ts, outstanding_debt_total, parse_ts};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertType {
    StuckJob,
    CapacityWarning,
    DebtWarning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: i64,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub job_id: Option<String>,
    pub user_id: Option<String>,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

struct NewAlert {
    alert_type: AlertType,
    severity: Severity,
    title: String,
    message: String,
    job_id: Option<String>,
    user_id: Option<String>,
}

/// What one generator run saw and wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertRunSummary {
    pub stuck_jobs_found: usize,
    pub alerts_created: usize,
    pub capacity_warning: bool,
    pub debt_warning: bool,
}

/// Run the stuck-job, capacity and debt checks once.
///
/// Checks are independent: a failing check is logged and the others still run.
pub async fn run_alert_checks(
    pool: &SqlitePool,
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> AlertRunSummary {
    let mut summary = AlertRunSummary::default();

    match check_stuck_jobs(pool, config, now).await {
        Ok((found, created)) => {
            summary.stuck_jobs_found = found;
            summary.alerts_created += created;
        }
        Err(e) => tracing::warn!(check = "stuck_job", error = %e, "alert check failed"),
    }

    match check_capacity(pool, config, now).await {
        Ok((over, created)) => {
            summary.capacity_warning = over;
            summary.alerts_created += usize::from(created);
        }
        Err(e) => tracing::warn!(check = "capacity_warning", error = %e, "alert check failed"),
    }

    match check_debt(pool, config, now).await {
        Ok((over, created)) => {
            summary.debt_warning = over;
            summary.alerts_created += usize::from(created);
        }
        Err(e) => tracing::warn!(check = "debt_warning", error = %e, "alert check failed"),
    }

    tracing::info!(
        stuck_jobs = summary.stuck_jobs_found,
        alerts_created = summary.alerts_created,
        capacity_warning = summary.capacity_warning,
        debt_warning = summary.debt_warning,
        "alert checks complete"
    );
    summary
}

async fn check_stuck_jobs(
    pool: &SqlitePool,
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> Result<(usize, usize), sqlx::Error> {
    let stuck = find_stuck_jobs(pool, &config.staleness, now).await?;
    let mut created = 0;
    for job in &stuck {
        let alert = NewAlert {
            alert_type: AlertType::StuckJob,
            severity: Severity::Critical,
            title: format!("Job stuck in {}", job.status),
            message: format!(
                "Job {} ({}) has been {} for {} minutes",
                job.job_id, job.service_id, job.status, job.minutes_stuck
            ),
            job_id: Some(job.job_id.clone()),
            user_id: Some(job.user_id.clone()),
        };
        if insert_alert_once(pool, &alert, now).await? {
            created += 1;
        }
    }
    Ok((stuck.len(), created))
}

async fn check_capacity(
    pool: &SqlitePool,
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> Result<(bool, bool), sqlx::Error> {
    let active = active_user_count(pool).await?;
    #[allow(clippy::cast_precision_loss)]
    let over = active as f64 > config.capacity_warning_level();
    if !over {
        return Ok((false, false));
    }
    let alert = NewAlert {
        alert_type: AlertType::CapacityWarning,
        severity: Severity::Warning,
        title: "Approaching user capacity".into(),
        message: format!(
            "{active} active users against a capacity of {}",
            config.user_capacity
        ),
        job_id: None,
        user_id: None,
    };
    Ok((true, insert_alert_once(pool, &alert, now).await?))
}

async fn check_debt(
    pool: &SqlitePool,
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> Result<(bool, bool), sqlx::Error> {
    let total = outstanding_debt_total(pool).await?;
    if total <= config.debt_warning_threshold_sats {
        return Ok((false, false));
    }
    let alert = NewAlert {
        alert_type: AlertType::DebtWarning,
        severity: Severity::Warning,
        title: "Outstanding debt above threshold".into(),
        message: format!(
            "Users owe {total} sats in total (threshold {})",
            config.debt_warning_threshold_sats
        ),
        job_id: None,
        user_id: None,
    };
    Ok((true, insert_alert_once(pool, &alert, now).await?))
}

/// Insert unless an unacknowledged alert of the same type and job exists.
/// Check and insert are one statement, so concurrent runs cannot both write.
async fn insert_alert_once(
    pool: &SqlitePool,
    alert: &NewAlert,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let inserted = sqlx::query(
        "INSERT INTO operator_alerts
            (alert_type, severity, title, message, job_id, user_id, acknowledged, created_at)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6, 0, ?7
         WHERE NOT EXISTS (
            SELECT 1 FROM operator_alerts
            WHERE alert_type = ?1
              AND acknowledged = 0
              AND ((?5 IS NULL AND job_id IS NULL) OR job_id = ?5)
         )",
    )
    .bind(alert.alert_type.to_string())
    .bind(alert.severity.to_string())
    .bind(&alert.title)
    .bind(&alert.message)
    .bind(alert.job_id.as_deref())
    .bind(alert.user_id.as_deref())
    .bind(format_ts(now))
    .execute(pool)
    .await?;

    let created = inserted.rows_affected() == 1;
    if created {
        tracing::warn!(
            alert_type = %alert.alert_type,
            job_id = alert.job_id.as_deref().unwrap_or("-"),
            "{}",
            alert.title
        );
    }
    Ok(created)
}

/// Mark an alert handled. `false` when no open alert has that id.
pub async fn acknowledge_alert(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let updated =
        sqlx::query("UPDATE operator_alerts SET acknowledged = 1 WHERE id = ? AND acknowledged = 0")
            .bind(id)
            .execute(pool)
            .await?;
    Ok(updated.rows_affected() == 1)
}

pub async fn list_open_alerts(pool: &SqlitePool) -> Result<Vec<Alert>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, alert_type, severity, title, message, job_id, user_id, acknowledged, created_at
         FROM operator_alerts WHERE acknowledged = 0 ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<Alert, sqlx::Error> {
            let alert_type: String = row.get("alert_type");
            let severity: String = row.get("severity");
            Ok(Alert {
                id: row.get("id"),
                alert_type: alert_type.parse().map_err(|_| {
                    sqlx::Error::Decode(format!("unexpected alert type '{alert_type}'").into())
                })?,
                severity: severity.parse().map_err(|_| {
                    sqlx::Error::Decode(format!("unexpected severity '{severity}'").into())
                })?,
                title: row.get("title"),
                message: row.get("message"),
                job_id: row.get("job_id"),
                user_id: row.get("user_id"),
                acknowledged: row.get::<i64, _>("acknowledged") != 0,
                created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            })
        })
        .collect()
}
