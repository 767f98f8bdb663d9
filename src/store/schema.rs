use anyhow::{Context, Result};
use sqlx::SqlitePool;

const SCHEMA: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email_hash  TEXT,
            debt_sats   INTEGER NOT NULL DEFAULT 0 CHECK (debt_sats >= 0),
            status      TEXT NOT NULL DEFAULT 'active',
            created_at  TEXT NOT NULL
        )",
    ),
    (
        "jobs",
        "CREATE TABLE IF NOT EXISTS jobs (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            service_id        TEXT NOT NULL,
            action            TEXT NOT NULL,
            trigger_source    TEXT NOT NULL,
            status            TEXT NOT NULL,
            status_updated_at TEXT NOT NULL,
            billing_date      TEXT,
            access_end_date   TEXT,
            outreach_count    INTEGER NOT NULL DEFAULT 0,
            next_outreach_at  TEXT,
            amount_sats       INTEGER,
            invoice_id        TEXT UNIQUE,
            otp_code          TEXT,
            created_at        TEXT NOT NULL
        )",
    ),
    (
        "jobs status index",
        "CREATE INDEX IF NOT EXISTS idx_jobs_status_updated ON jobs(status, status_updated_at)",
    ),
    (
        "job_status_history",
        "CREATE TABLE IF NOT EXISTS job_status_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id      TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            from_status TEXT,
            to_status   TEXT NOT NULL,
            actor       TEXT NOT NULL,
            reason      TEXT,
            created_at  TEXT NOT NULL
        )",
    ),
    (
        "job_status_history index",
        "CREATE INDEX IF NOT EXISTS idx_job_status_history_job ON job_status_history(job_id)",
    ),
    (
        "transactions",
        "CREATE TABLE IF NOT EXISTS transactions (
            job_id      TEXT PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            amount_sats INTEGER,
            invoice_id  TEXT,
            status      TEXT NOT NULL,
            paid_at     TEXT,
            created_at  TEXT NOT NULL
        )",
    ),
    (
        "revenue_ledger",
        "CREATE TABLE IF NOT EXISTS revenue_ledger (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id         TEXT NOT NULL,
            service_id     TEXT NOT NULL,
            action         TEXT NOT NULL,
            amount_sats    INTEGER NOT NULL,
            payment_status TEXT NOT NULL,
            recorded_at    TEXT NOT NULL
        )",
    ),
    (
        "revenue_ledger update guard",
        "CREATE TRIGGER IF NOT EXISTS revenue_ledger_no_update
         BEFORE UPDATE ON revenue_ledger
         BEGIN
            SELECT RAISE(ABORT, 'revenue_ledger is append-only');
         END",
    ),
    (
        "revenue_ledger delete guard",
        "CREATE TRIGGER IF NOT EXISTS revenue_ledger_no_delete
         BEFORE DELETE ON revenue_ledger
         BEGIN
            SELECT RAISE(ABORT, 'revenue_ledger is append-only');
         END",
    ),
    (
        "blocklist",
        "CREATE TABLE IF NOT EXISTS blocklist (
            email_hash TEXT PRIMARY KEY,
            debt_sats  INTEGER NOT NULL CHECK (debt_sats >= 0),
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "operator_alerts",
        "CREATE TABLE IF NOT EXISTS operator_alerts (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_type   TEXT NOT NULL,
            severity     TEXT NOT NULL,
            title        TEXT NOT NULL,
            message      TEXT NOT NULL,
            job_id       TEXT,
            user_id      TEXT,
            acknowledged INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        )",
    ),
    (
        "operator_alerts index",
        "CREATE INDEX IF NOT EXISTS idx_operator_alerts_open
         ON operator_alerts(alert_type, acknowledged)",
    ),
];

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for (name, statement) in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {name}"))?;
    }
    Ok(())
}
