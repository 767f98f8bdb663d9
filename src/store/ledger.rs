use super::parse_ts;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// One append-only revenue row written by settlement.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub job_id: String,
    pub service_id: String,
    pub action: String,
    pub amount_sats: i64,
    pub payment_status: String,
    pub recorded_at: DateTime<Utc>,
}

pub async fn list_ledger_entries(
    pool: &SqlitePool,
    job_id: Option<&str>,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, job_id, service_id, action, amount_sats, payment_status, recorded_at
         FROM revenue_ledger
         WHERE (?1 IS NULL OR job_id = ?1)
         ORDER BY id ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<LedgerEntry, sqlx::Error> {
            Ok(LedgerEntry {
                id: row.get("id"),
                job_id: row.get("job_id"),
                service_id: row.get("service_id"),
                action: row.get("action"),
                amount_sats: row.get("amount_sats"),
                payment_status: row.get("payment_status"),
                recorded_at: parse_ts(&row.get::<String, _>("recorded_at"))?,
            })
        })
        .collect()
}
