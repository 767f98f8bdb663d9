use crate::error::{SettlementError, TransitionError};
use crate::jobs::{Actor, Job, JobStatus, compare_and_set_status, fetch_job, record_transition};
use crate::store::{format_ts, with_transaction};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

/// Confirms payments and keeps job status, debt, ledger and blocklist in step.
#[derive(Debug, Clone)]
pub struct SettlementEngine {
    pool: SqlitePool,
}

impl SettlementEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Settle one job exactly once.
    ///
    /// Lock, branch on the locked row, then mutate. All writes share one
    /// transaction; any failure leaves the job in its pre-settlement state.
    pub async fn settle(&self, job_id: &str, now: DateTime<Utc>) -> Result<Job, SettlementError> {
        let job_id = job_id.to_string();
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                // No-op write takes the database write lock before the read.
                let locked = sqlx::query("UPDATE jobs SET id = id WHERE id = ?")
                    .bind(&job_id)
                    .execute(&mut *conn)
                    .await?;
                if locked.rows_affected() == 0 {
                    return Err(SettlementError::NotFound(job_id.clone()));
                }
                let job = fetch_job(conn, &job_id)
                    .await?
                    .ok_or_else(|| SettlementError::NotFound(job_id.clone()))?;

                if job.status.is_paid() {
                    return Err(SettlementError::AlreadyPaid(job_id.clone()));
                }
                let (target, payment_status) = settlement_target(&job)?;

                sqlx::query(
                    "UPDATE jobs SET status = ?, status_updated_at = ? WHERE id = ? AND status = ?",
                )
                .bind(target.as_db())
                .bind(format_ts(now))
                .bind(&job.id)
                .bind(job.status.as_db())
                .execute(&mut *conn)
                .await?;
                record_transition(
                    conn,
                    &job.id,
                    Some(job.status),
                    target,
                    Actor::Settlement,
                    None,
                    now,
                )
                .await?;

                sqlx::query(
                    "INSERT INTO transactions (job_id, user_id, amount_sats, invoice_id, status, paid_at, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(job_id) DO UPDATE SET
                        status = excluded.status,
                        paid_at = excluded.paid_at",
                )
                .bind(&job.id)
                .bind(&job.user_id)
                .bind(job.amount_sats)
                .bind(&job.invoice_id)
                .bind(payment_status)
                .bind(format_ts(now))
                .bind(format_ts(now))
                .execute(&mut *conn)
                .await?;

                if let Some(amount) = job.amount_sats.filter(|a| *a > 0) {
                    credit_payment(conn, &job, amount, payment_status, now).await?;
                }

                tracing::info!(
                    job_id = %job.id,
                    from = %job.status,
                    to = %target,
                    amount_sats = job.amount_sats.unwrap_or(0),
                    "job settled"
                );
                fetch_job(conn, &job_id)
                    .await?
                    .ok_or_else(|| SettlementError::NotFound(job_id.clone()))
            })
        })
        .await
    }

    /// Resolve a payment event's invoice id to its job, then settle it.
    pub async fn settle_by_invoice(
        &self,
        invoice_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, SettlementError> {
        let job_id = sqlx::query_scalar::<_, String>("SELECT id FROM jobs WHERE invoice_id = ?")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("invoice {invoice_id}")))?;
        self.settle(&job_id, now).await
    }

    /// Write off an unpaid job: mark it reneged and add its amount to the
    /// blocklist entry for the user's email hash. The user's debt already
    /// holds the amount from when the invoice was attached.
    pub async fn record_renege(&self, job_id: &str, now: DateTime<Utc>) -> Result<Job, TransitionError> {
        let job_id = job_id.to_string();
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let job = fetch_job(conn, &job_id)
                    .await?
                    .ok_or_else(|| TransitionError::NotFound(job_id.clone()))?;
                if !job.status.can_transition_to(JobStatus::CompletedReneged) {
                    return Err(TransitionError::NotAllowed {
                        from: job.status.to_string(),
                        to: JobStatus::CompletedReneged.to_string(),
                    });
                }

                compare_and_set_status(conn, &job, JobStatus::CompletedReneged, now).await?;
                record_transition(
                    conn,
                    &job.id,
                    Some(job.status),
                    JobStatus::CompletedReneged,
                    Actor::Settlement,
                    None,
                    now,
                )
                .await?;

                sqlx::query(
                    "INSERT INTO transactions (job_id, user_id, amount_sats, invoice_id, status, created_at)
                     VALUES (?, ?, ?, ?, 'reneged', ?)
                     ON CONFLICT(job_id) DO UPDATE SET status = 'reneged'",
                )
                .bind(&job.id)
                .bind(&job.user_id)
                .bind(job.amount_sats)
                .bind(&job.invoice_id)
                .bind(format_ts(now))
                .execute(&mut *conn)
                .await?;

                if let Some(amount) = job.amount_sats.filter(|a| *a > 0) {
                    if let Some(hash) = email_hash(conn, &job.user_id).await? {
                        sqlx::query(
                            "INSERT INTO blocklist (email_hash, debt_sats, updated_at) VALUES (?, ?, ?)
                             ON CONFLICT(email_hash) DO UPDATE SET
                                debt_sats = debt_sats + excluded.debt_sats,
                                updated_at = excluded.updated_at",
                        )
                        .bind(&hash)
                        .bind(amount)
                        .bind(format_ts(now))
                        .execute(&mut *conn)
                        .await?;
                    }
                }

                tracing::warn!(
                    job_id = %job.id,
                    user_id = %job.user_id,
                    amount_sats = job.amount_sats.unwrap_or(0),
                    "job reneged"
                );
                fetch_job(conn, &job_id)
                    .await?
                    .ok_or_else(|| TransitionError::NotFound(job_id.clone()))
            })
        })
        .await
    }
}

/// Target status and transaction status for a job that is not yet paid.
///
/// A reneged job always takes the late-payment branch, even when it still
/// carries an invoice id from an earlier attempt.
fn settlement_target(job: &Job) -> Result<(JobStatus, &'static str), SettlementError> {
    if job.status == JobStatus::CompletedReneged {
        return Ok((JobStatus::CompletedEventual, "eventual"));
    }
    if job.invoice_id.is_none() {
        tracing::error!(
            job_id = %job.id,
            status = %job.status,
            "settlement requested for job with no invoice and no renege"
        );
        return Err(SettlementError::NotPayable {
            job_id: job.id.clone(),
            reason: "no invoice and not reneged".into(),
        });
    }
    if !job.status.can_transition_to(JobStatus::CompletedPaid) {
        return Err(SettlementError::NotPayable {
            job_id: job.id.clone(),
            reason: format!("cannot settle from {}", job.status),
        });
    }
    Ok((JobStatus::CompletedPaid, "paid"))
}

async fn credit_payment(
    conn: &mut SqliteConnection,
    job: &Job,
    amount: i64,
    payment_status: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET debt_sats = MAX(debt_sats - ?, 0) WHERE id = ?")
        .bind(amount)
        .bind(&job.user_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO revenue_ledger (job_id, service_id, action, amount_sats, payment_status, recorded_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&job.id)
    .bind(&job.service_id)
    .bind(job.action.to_string())
    .bind(amount)
    .bind(payment_status)
    .bind(format_ts(now))
    .execute(&mut *conn)
    .await?;

    // Only a reneged job ever added to the blocklist.
    if payment_status != "eventual" {
        return Ok(());
    }
    if let Some(hash) = email_hash(conn, &job.user_id).await? {
        sqlx::query(
            "UPDATE blocklist SET debt_sats = MAX(debt_sats - ?, 0), updated_at = ?
             WHERE email_hash = ?",
        )
        .bind(amount)
        .bind(format_ts(now))
        .bind(&hash)
        .execute(&mut *conn)
        .await?;
        sqlx::query("DELETE FROM blocklist WHERE email_hash = ? AND debt_sats = 0")
            .bind(&hash)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn email_hash(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<String>, sqlx::Error> {
    let hash = sqlx::query_scalar::<_, Option<String>>("SELECT email_hash FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .flatten();
    Ok(hash)
}
