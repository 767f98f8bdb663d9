use super::format_ts;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

/// One-way key for the blocklist: hex SHA-256 of the trimmed, lowercased email.
pub fn hash_email(email: &str) -> String {
    hex::encode(Sha256::digest(email.trim().to_lowercase().as_bytes()))
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: Option<&'a str>,
    pub status: &'a str,
}

/// Minimal user row. Account management lives outside this service; the
/// row only carries what settlement and capacity checks read.
pub async fn create_user(pool: &SqlitePool, user: &NewUser<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, email_hash, debt_sats, status, created_at) VALUES (?, ?, 0, ?, ?)",
    )
    .bind(user.id)
    .bind(user.email.map(hash_email))
    .bind(user.status)
    .bind(format_ts(Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn user_debt(pool: &SqlitePool, user_id: &str) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query("SELECT debt_sats FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get::<i64, _>("debt_sats")))
}

pub async fn blocklist_debt(
    pool: &SqlitePool,
    email_hash: &str,
) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query("SELECT debt_sats FROM blocklist WHERE email_hash = ?")
        .bind(email_hash)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get::<i64, _>("debt_sats")))
}

pub async fn active_user_count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) FROM users WHERE status = 'active'")
        .fetch_one(pool)
        .await?;
    Ok(row.get(0))
}

/// Sum of positive user debt balances.
pub async fn outstanding_debt_total(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COALESCE(SUM(debt_sats), 0) FROM users WHERE debt_sats > 0")
        .fetch_one(pool)
        .await?;
    Ok(row.get(0))
}
