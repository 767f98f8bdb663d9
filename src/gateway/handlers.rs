use super::AppState;
use crate::error::{PaymentError, TransitionError};
use crate::jobs::{AgentReport, JobStatus};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;

const DEFAULT_PENDING_LIMIT: u32 = 20;
const MAX_PENDING_LIMIT: u32 = 100;

pub(super) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

pub(super) fn store_error_response(error: &sqlx::Error) -> Response {
    tracing::error!(error = %error, "store operation failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
}

pub(super) fn transition_error_response(error: &TransitionError) -> Response {
    if let TransitionError::Store(inner) = error {
        return store_error_response(inner);
    }
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, &error.to_string())
}

pub(super) fn payment_error_response(error: &PaymentError) -> Response {
    tracing::error!(error = %error, "invoice provider call failed");
    match error {
        PaymentError::NotConfigured => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Invoice provider not configured")
        }
        PaymentError::Request(_) | PaymentError::Status { .. } => {
            error_response(StatusCode::BAD_GATEWAY, "Invoice provider unavailable")
        }
    }
}

/// GET /health: always public (no secrets leaked)
pub(super) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct PendingQuery {
    limit: Option<u32>,
}

/// GET /agent/jobs/pending
pub(super) async fn handle_pending_jobs(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PENDING_LIMIT)
        .min(MAX_PENDING_LIMIT);
    match state.jobs.list_by_status(JobStatus::Pending, limit).await {
        Ok(jobs) => Json(serde_json::json!({"jobs": jobs})).into_response(),
        Err(e) => store_error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ClaimRequest {
    job_ids: Vec<String>,
}

/// POST /agent/jobs/claim
pub(super) async fn handle_claim_jobs(
    State(state): State<AppState>,
    Json(body): Json<ClaimRequest>,
) -> Response {
    match state.jobs.claim(&body.job_ids, Utc::now()).await {
        Ok(claimed) => {
            tracing::info!(
                requested = body.job_ids.len(),
                claimed = claimed.len(),
                "agent claimed jobs"
            );
            Json(serde_json::json!({"jobs": claimed})).into_response()
        }
        Err(e) => store_error_response(&e),
    }
}

/// POST /agent/jobs/{id}/status
pub(super) async fn handle_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(report): Json<AgentReport>,
) -> Response {
    match state
        .jobs
        .apply_agent_report(&job_id, &report, Utc::now())
        .await
    {
        Ok(job) => Json(serde_json::json!({"job": job})).into_response(),
        Err(e) => transition_error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CompleteRequest {
    amount_sats: i64,
    /// Invoice opened outside this service; used only when no provider is configured.
    #[serde(default)]
    invoice_id: Option<String>,
}

/// POST /agent/jobs/{id}/complete: price the performed action and attach its invoice.
pub(super) async fn handle_job_complete(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<CompleteRequest>,
) -> Response {
    if body.amount_sats <= 0 {
        return error_response(StatusCode::BAD_REQUEST, "amount_sats must be positive");
    }
    let job = match state.jobs.get(&job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Job not found"),
        Err(e) => return store_error_response(&e),
    };
    if let Some(existing) = &job.invoice_id {
        return transition_error_response(&TransitionError::AlreadyInvoiced {
            job_id: job.id.clone(),
            invoice_id: existing.clone(),
        });
    }

    let (invoice_id, checkout_link) = match (&state.invoices, body.invoice_id) {
        (Some(provider), _) => {
            let memo = format!("{} {}", job.service_id, job.action);
            match provider.create_invoice(body.amount_sats, &job.id, &memo).await {
                Ok(invoice) => (invoice.id, invoice.checkout_link),
                Err(e) => return payment_error_response(&e),
            }
        }
        (None, Some(external)) if !external.trim().is_empty() => (external, None),
        (None, _) => return payment_error_response(&PaymentError::NotConfigured),
    };

    match state
        .jobs
        .attach_invoice(&job_id, body.amount_sats, &invoice_id, Utc::now())
        .await
    {
        Ok(job) => Json(serde_json::json!({
            "job": job,
            "checkout_link": checkout_link,
        }))
        .into_response(),
        Err(e) => transition_error_response(&e),
    }
}

/// GET /agent/jobs/{id}/otp: 204 until the user has relayed a code.
pub(super) async fn handle_take_otp(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.jobs.get(&job_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Job not found"),
        Err(e) => return store_error_response(&e),
    }
    match state.jobs.take_otp(&job_id).await {
        Ok(Some(code)) => Json(serde_json::json!({"code": code})).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(&e),
    }
}
