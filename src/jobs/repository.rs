use super::types::{
    Actor, AgentReport, Job, JobAction, JobStatus, NewJob, StatusChange, TriggerSource,
};
use crate::error::TransitionError;
use crate::store::{format_ts, parse_opt_ts, parse_ts, with_transaction};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, user_id, service_id, action, trigger_source, status,
    status_updated_at, billing_date, access_end_date, outreach_count, next_outreach_at,
    amount_sats, invoice_id, created_at";

/// Persisted jobs and their status history.
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create(&self, new_job: &NewJob, now: DateTime<Utc>) -> Result<Job, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let new_job = new_job.clone();
        let job_id = id.clone();
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO jobs (
                        id, user_id, service_id, action, trigger_source, status,
                        status_updated_at, billing_date, created_at
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&job_id)
                .bind(&new_job.user_id)
                .bind(&new_job.service_id)
                .bind(new_job.action.to_string())
                .bind(new_job.trigger.to_string())
                .bind(JobStatus::Pending.as_db())
                .bind(format_ts(now))
                .bind(new_job.billing_date.map(|d| d.to_string()))
                .bind(format_ts(now))
                .execute(&mut *conn)
                .await?;
                record_transition(conn, &job_id, None, JobStatus::Pending, Actor::Scheduler, None, now)
                    .await?;
                fetch_job(conn, &job_id).await?.ok_or(sqlx::Error::RowNotFound)
            })
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_job(&mut conn, id).await
    }

    pub async fn find_by_invoice(&self, invoice_id: &str) -> Result<Option<Job>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE invoice_id = ?"))
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    /// Oldest-first jobs in `status`.
    pub async fn list_by_status(
        &self,
        status: JobStatus,
        limit: u32,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ? ORDER BY created_at ASC LIMIT ?"
        ))
        .bind(status.as_db())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Move every id still in `pending` to `dispatched`, atomically.
    ///
    /// Ids that are unknown or have already moved on are skipped without error.
    pub async fn claim(&self, ids: &[String], now: DateTime<Utc>) -> Result<Vec<Job>, sqlx::Error> {
        let ids = ids.to_vec();
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let mut claimed = Vec::new();
                for id in &ids {
                    let updated = sqlx::query(
                        "UPDATE jobs SET status = ?, status_updated_at = ?
                         WHERE id = ? AND status = ?",
                    )
                    .bind(JobStatus::Dispatched.as_db())
                    .bind(format_ts(now))
                    .bind(id)
                    .bind(JobStatus::Pending.as_db())
                    .execute(&mut *conn)
                    .await?;
                    if updated.rows_affected() == 0 {
                        continue;
                    }
                    record_transition(
                        conn,
                        id,
                        Some(JobStatus::Pending),
                        JobStatus::Dispatched,
                        Actor::Agent,
                        None,
                        now,
                    )
                    .await?;
                    if let Some(job) = fetch_job(conn, id).await? {
                        claimed.push(job);
                    }
                }
                Ok(claimed)
            })
        })
        .await
    }

    /// Apply an agent status callback after validating it against the graph.
    pub async fn apply_agent_report(
        &self,
        id: &str,
        report: &AgentReport,
        now: DateTime<Utc>,
    ) -> Result<Job, TransitionError> {
        let id = id.to_string();
        let report = report.clone();
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let job = fetch_job(conn, &id)
                    .await?
                    .ok_or_else(|| TransitionError::NotFound(id.clone()))?;
                if !report.status.is_agent_reportable() || !job.status.can_transition_to(report.status)
                {
                    return Err(not_allowed(job.status, report.status));
                }

                compare_and_set_status(conn, &job, report.status, now).await?;

                let outreach_bump = i64::from(report.status == JobStatus::OutreachSent);
                sqlx::query(
                    "UPDATE jobs SET
                        outreach_count = outreach_count + ?,
                        next_outreach_at = COALESCE(?, next_outreach_at),
                        access_end_date = COALESCE(?, access_end_date),
                        billing_date = COALESCE(?, billing_date)
                     WHERE id = ?",
                )
                .bind(outreach_bump)
                .bind(report.next_outreach_at.map(format_ts))
                .bind(report.access_end_date.map(|d| d.to_string()))
                .bind(report.billing_date.map(|d| d.to_string()))
                .bind(&id)
                .execute(&mut *conn)
                .await?;

                record_transition(
                    conn,
                    &id,
                    Some(job.status),
                    report.status,
                    Actor::Agent,
                    report.note.as_deref(),
                    now,
                )
                .await?;
                fetch_job(conn, &id)
                    .await?
                    .ok_or_else(|| TransitionError::NotFound(id.clone()))
            })
        })
        .await
    }

    /// Record the price and invoice of a performed action, open its
    /// transaction record and add the amount to the user's debt. Status is
    /// left unchanged. A job is invoiced once; a second attach is refused so
    /// the first invoice stays resolvable.
    pub async fn attach_invoice(
        &self,
        id: &str,
        amount_sats: i64,
        invoice_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, TransitionError> {
        let id = id.to_string();
        let invoice_id = invoice_id.to_string();
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let job = fetch_job(conn, &id)
                    .await?
                    .ok_or_else(|| TransitionError::NotFound(id.clone()))?;
                if job.status == JobStatus::Pending || job.status.is_terminal() {
                    return Err(TransitionError::NotAllowed {
                        from: job.status.to_string(),
                        to: "invoiced".into(),
                    });
                }
                if let Some(existing) = &job.invoice_id {
                    return Err(TransitionError::AlreadyInvoiced {
                        job_id: id.clone(),
                        invoice_id: existing.clone(),
                    });
                }

                let updated = sqlx::query(
                    "UPDATE jobs SET amount_sats = ?, invoice_id = ? WHERE id = ? AND invoice_id IS NULL",
                )
                .bind(amount_sats)
                .bind(&invoice_id)
                .bind(&id)
                .execute(&mut *conn)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(TransitionError::AlreadyInvoiced {
                        job_id: id.clone(),
                        invoice_id: invoice_id.clone(),
                    });
                }
                sqlx::query("UPDATE users SET debt_sats = debt_sats + ? WHERE id = ?")
                    .bind(amount_sats)
                    .bind(&job.user_id)
                    .execute(&mut *conn)
                    .await?;
                sqlx::query(
                    "INSERT INTO transactions (job_id, user_id, amount_sats, invoice_id, status, created_at)
                     VALUES (?, ?, ?, ?, 'pending', ?)
                     ON CONFLICT(job_id) DO UPDATE SET
                        amount_sats = excluded.amount_sats,
                        invoice_id = excluded.invoice_id",
                )
                .bind(&id)
                .bind(&job.user_id)
                .bind(amount_sats)
                .bind(&invoice_id)
                .bind(format_ts(now))
                .execute(&mut *conn)
                .await?;

                fetch_job(conn, &id)
                    .await?
                    .ok_or_else(|| TransitionError::NotFound(id.clone()))
            })
        })
        .await
    }

    /// Relay a one-time code from the user to the agent.
    pub async fn submit_otp(&self, id: &str, code: &str) -> Result<(), TransitionError> {
        let updated = sqlx::query("UPDATE jobs SET otp_code = ? WHERE id = ? AND status = ?")
            .bind(code.trim())
            .bind(id)
            .bind(JobStatus::AwaitingOtp.as_db())
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 1 {
            return Ok(());
        }
        match self.get(id).await? {
            None => Err(TransitionError::NotFound(id.to_string())),
            Some(job) => Err(TransitionError::NotAllowed {
                from: job.status.to_string(),
                to: "otp_submitted".into(),
            }),
        }
    }

    /// Hand the relayed code to the agent exactly once.
    pub async fn take_otp(&self, id: &str) -> Result<Option<String>, sqlx::Error> {
        let id = id.to_string();
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let code = sqlx::query_scalar::<_, Option<String>>(
                    "SELECT otp_code FROM jobs WHERE id = ?",
                )
                .bind(&id)
                .fetch_optional(&mut *conn)
                .await?
                .flatten();
                if code.is_some() {
                    sqlx::query("UPDATE jobs SET otp_code = NULL WHERE id = ?")
                        .bind(&id)
                        .execute(&mut *conn)
                        .await?;
                }
                Ok(code)
            })
        })
        .await
    }

    /// Operator override. The reason is mandatory and lands in the history.
    pub async fn force_status(
        &self,
        id: &str,
        status: JobStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, TransitionError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(TransitionError::MissingReason);
        }
        let id = id.to_string();
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let job = fetch_job(conn, &id)
                    .await?
                    .ok_or_else(|| TransitionError::NotFound(id.clone()))?;
                if !job.status.can_force_to(status) {
                    return Err(not_allowed(job.status, status));
                }
                compare_and_set_status(conn, &job, status, now).await?;
                record_transition(
                    conn,
                    &id,
                    Some(job.status),
                    status,
                    Actor::Operator,
                    Some(&reason),
                    now,
                )
                .await?;
                tracing::warn!(
                    job_id = %id,
                    from = %job.status,
                    to = %status,
                    reason = %reason,
                    "operator forced job status"
                );
                fetch_job(conn, &id)
                    .await?
                    .ok_or_else(|| TransitionError::NotFound(id.clone()))
            })
        })
        .await
    }

    pub async fn history(&self, id: &str) -> Result<Vec<StatusChange>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT from_status, to_status, actor, reason, created_at
             FROM job_status_history WHERE job_id = ? ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<StatusChange, sqlx::Error> {
                let from_raw: Option<String> = row.get("from_status");
                Ok(StatusChange {
                    from_status: from_raw.as_deref().map(decode_status).transpose()?,
                    to_status: decode_status(&row.get::<String, _>("to_status"))?,
                    actor: decode_enum(&row.get::<String, _>("actor"))?,
                    reason: row.get("reason"),
                    at: parse_ts(&row.get::<String, _>("created_at"))?,
                })
            })
            .collect()
    }
}

// ── Shared helpers (used inside settlement transactions too) ───────────────

pub(crate) async fn fetch_job(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_job).transpose()
}

pub(crate) async fn record_transition(
    conn: &mut SqliteConnection,
    job_id: &str,
    from: Option<JobStatus>,
    to: JobStatus,
    actor: Actor,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO job_status_history (job_id, from_status, to_status, actor, reason, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(from.map(JobStatus::as_db))
    .bind(to.as_db())
    .bind(actor.to_string())
    .bind(reason)
    .bind(format_ts(now))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Write `next` only if the row still holds the status `job` was read with.
pub(crate) async fn compare_and_set_status(
    conn: &mut SqliteConnection,
    job: &Job,
    next: JobStatus,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    let updated = sqlx::query(
        "UPDATE jobs SET status = ?, status_updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(next.as_db())
    .bind(format_ts(now))
    .bind(&job.id)
    .bind(job.status.as_db())
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(not_allowed(job.status, next));
    }
    Ok(())
}

fn not_allowed(from: JobStatus, to: JobStatus) -> TransitionError {
    TransitionError::NotAllowed {
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn decode_status(raw: &str) -> Result<JobStatus, sqlx::Error> {
    decode_enum(raw)
}

fn decode_enum<T: FromStr>(raw: &str) -> Result<T, sqlx::Error> {
    raw.parse()
        .map_err(|_| sqlx::Error::Decode(format!("unexpected enum value '{raw}'").into()))
}

fn decode_date(raw: Option<String>) -> Result<Option<NaiveDate>, sqlx::Error> {
    raw.map(|value| {
        value
            .parse::<NaiveDate>()
            .map_err(|e| sqlx::Error::Decode(format!("invalid date '{value}': {e}").into()))
    })
    .transpose()
}

fn row_to_job(row: &SqliteRow) -> Result<Job, sqlx::Error> {
    let action: JobAction = decode_enum(&row.get::<String, _>("action"))?;
    let trigger: TriggerSource = decode_enum(&row.get::<String, _>("trigger_source"))?;
    let outreach_count: i64 = row.get("outreach_count");

    Ok(Job {
        id: row.get("id"),
        user_id: row.get("user_id"),
        service_id: row.get("service_id"),
        action,
        trigger,
        status: decode_status(&row.get::<String, _>("status"))?,
        status_updated_at: parse_ts(&row.get::<String, _>("status_updated_at"))?,
        billing_date: decode_date(row.get("billing_date"))?,
        access_end_date: decode_date(row.get("access_end_date"))?,
        outreach_count: u32::try_from(outreach_count).unwrap_or(u32::MAX),
        next_outreach_at: parse_opt_ts(row.get("next_outreach_at"))?,
        amount_sats: row.get("amount_sats"),
        invoice_id: row.get("invoice_id"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}
