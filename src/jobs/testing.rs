use super::{Job, JobAction, JobStatus, JobStore, NewJob, TriggerSource};
use crate::store::{NewUser, create_user, format_ts, open_in_memory};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub(crate) async fn store_with_user(user_id: &str, email: Option<&str>) -> JobStore {
    let pool = open_in_memory().await.unwrap();
    seed_user(&pool, user_id, email).await;
    JobStore::new(pool)
}

pub(crate) async fn seed_user(pool: &SqlitePool, user_id: &str, email: Option<&str>) {
    create_user(
        pool,
        &NewUser {
            id: user_id,
            email,
            status: "active",
        },
    )
    .await
    .unwrap();
}

pub(crate) async fn new_job(store: &JobStore, user_id: &str) -> Job {
    store
        .create(
            &NewJob {
                user_id: user_id.into(),
                service_id: "netflix".into(),
                action: JobAction::Cancel,
                trigger: TriggerSource::OnDemand,
                billing_date: None,
            },
            Utc::now(),
        )
        .await
        .unwrap()
}

/// Put a row straight into `status` as of `at`, bypassing the transition graph.
pub(crate) async fn place(pool: &SqlitePool, job_id: &str, status: JobStatus, at: DateTime<Utc>) {
    sqlx::query("UPDATE jobs SET status = ?, status_updated_at = ? WHERE id = ?")
        .bind(status.as_db())
        .bind(format_ts(at))
        .bind(job_id)
        .execute(pool)
        .await
        .unwrap();
}

pub(crate) async fn set_debt(pool: &SqlitePool, user_id: &str, debt_sats: i64) {
    sqlx::query("UPDATE users SET debt_sats = ? WHERE id = ?")
        .bind(debt_sats)
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
}
