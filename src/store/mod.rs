//! SQLite persistence shared by the job store, settlement engine and monitor.

mod ledger;
mod schema;
mod users;

pub use ledger::{LedgerEntry, list_ledger_entries};
pub use schema::ensure_schema;
pub use users::{
    NewUser, active_user_count, blocklist_debt, create_user, hash_email, outstanding_debt_total,
    user_debt,
};

use crate::config::Config;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use std::time::Duration;

/// Open the configured database, creating file and schema as needed.
pub async fn open_pool(config: &Config) -> Result<SqlitePool> {
    let db_path = config.database_path();
    open_pool_at(
        &db_path,
        config.database.max_connections,
        Duration::from_millis(config.database.busy_timeout_ms),
    )
    .await
}

pub async fn open_pool_at(
    db_path: &Path,
    max_connections: u32,
    busy_timeout: Duration,
) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(busy_timeout);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database (tests and dry runs).
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(Option::<Duration>::None)
        .max_lifetime(Option::<Duration>::None)
        .connect_with(options)
        .await
        .context("Failed to open in-memory database")?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Run `f` inside one transaction: commit on `Ok`, roll back on `Err`.
///
/// If `f` panics the transaction guard is dropped during unwinding, which
/// also rolls back, so no partial write is ever committed.
pub async fn with_transaction<T, E, F>(pool: &SqlitePool, f: F) -> std::result::Result<T, E>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, std::result::Result<T, E>>,
    E: From<sqlx::Error>,
{
    let mut tx = pool.begin().await?;
    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::warn!(error = %rollback_error, "transaction rollback failed");
            }
            Err(error)
        }
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> std::result::Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(format!("invalid timestamp '{raw}': {e}").into()))
}

pub fn parse_opt_ts(
    raw: Option<String>,
) -> std::result::Result<Option<DateTime<Utc>>, sqlx::Error> {
    raw.as_deref().map(parse_ts).transpose()
}
