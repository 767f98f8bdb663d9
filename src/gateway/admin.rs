use super::AppState;
use super::handlers::{error_response, store_error_response, transition_error_response};
use crate::error::TransitionError;
use crate::jobs::JobStatus;
use crate::monitor::{acknowledge_alert, find_stuck_jobs, list_open_alerts, run_alert_checks};
use crate::settlement::SettlementOutcome;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::str::FromStr;

/// POST /admin/jobs/{id}/settle
pub(super) async fn handle_settle(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let outcome = SettlementOutcome::from(state.settlement.settle(&job_id, Utc::now()).await);
    let status = StatusCode::from_u16(outcome.status_code).unwrap_or(StatusCode::OK);
    (status, Json(outcome)).into_response()
}

/// POST /admin/jobs/{id}/renege
pub(super) async fn handle_renege(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.settlement.record_renege(&job_id, Utc::now()).await {
        Ok(job) => Json(serde_json::json!({"job": job})).into_response(),
        Err(e) => transition_error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ForceStatusRequest {
    status: String,
    #[serde(default)]
    reason: String,
}

/// POST /admin/jobs/{id}/force-status
pub(super) async fn handle_force_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<ForceStatusRequest>,
) -> Response {
    let Ok(status) = JobStatus::from_str(body.status.trim()) else {
        return transition_error_response(&TransitionError::UnknownStatus(body.status));
    };
    match state
        .jobs
        .force_status(&job_id, status, &body.reason, Utc::now())
        .await
    {
        Ok(job) => Json(serde_json::json!({"job": job})).into_response(),
        Err(e) => transition_error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct OtpRequest {
    code: String,
}

/// POST /admin/jobs/{id}/otp: relay a one-time code on the user's behalf.
pub(super) async fn handle_submit_otp(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<OtpRequest>,
) -> Response {
    if body.code.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "code must not be empty");
    }
    match state.jobs.submit_otp(&job_id, &body.code).await {
        Ok(()) => Json(serde_json::json!({"status": "ok"})).into_response(),
        Err(e) => transition_error_response(&e),
    }
}

/// GET /admin/jobs/{id}/history
pub(super) async fn handle_job_history(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.jobs.history(&job_id).await {
        Ok(history) if history.is_empty() => {
            error_response(StatusCode::NOT_FOUND, "Job not found")
        }
        Ok(history) => Json(serde_json::json!({"history": history})).into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// GET /admin/jobs/stuck
pub(super) async fn handle_stuck_jobs(State(state): State<AppState>) -> Response {
    match find_stuck_jobs(&state.pool, &state.config.monitor.staleness, Utc::now()).await {
        Ok(jobs) => Json(serde_json::json!({"jobs": jobs})).into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// POST /admin/alerts/run
pub(super) async fn handle_run_alerts(State(state): State<AppState>) -> Response {
    let summary = run_alert_checks(&state.pool, &state.config.monitor, Utc::now()).await;
    Json(summary).into_response()
}

/// GET /admin/alerts
pub(super) async fn handle_list_alerts(State(state): State<AppState>) -> Response {
    match list_open_alerts(&state.pool).await {
        Ok(alerts) => Json(serde_json::json!({"alerts": alerts})).into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// POST /admin/alerts/{id}/ack
pub(super) async fn handle_ack_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<i64>,
) -> Response {
    match acknowledge_alert(&state.pool, alert_id).await {
        Ok(true) => Json(serde_json::json!({"status": "acknowledged"})).into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "No open alert with that id"),
        Err(e) => store_error_response(&e),
    }
}
