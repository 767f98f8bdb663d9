use super::AppState;
use super::handlers::{error_response, payment_error_response};
use crate::error::SettlementError;
use crate::security::verify_webhook_signature;
use crate::settlement::SettlementOutcome;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;

pub(super) const SIGNATURE_HEADER: &str = "BTCPay-Sig";

/// Event types that mean the invoice has been paid in full.
const SETTLED_EVENTS: &[&str] = &["InvoiceSettled", "InvoicePaymentSettled"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    invoice_id: Option<String>,
}

/// POST /webhooks/payment: payment confirmation from the invoice provider.
pub(super) async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let secret = state.webhook_secret.as_deref().unwrap_or_default();
    if !verify_webhook_signature(secret, &body, signature) {
        tracing::warn!(
            secret_configured = !secret.is_empty(),
            "payment webhook signature rejected"
        );
        return error_response(StatusCode::UNAUTHORIZED, "Invalid signature");
    }

    let Ok(event) = serde_json::from_slice::<PaymentEvent>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON payload");
    };
    if !SETTLED_EVENTS.contains(&event.event_type.as_str()) {
        tracing::debug!(event_type = %event.event_type, "payment webhook ignored");
        return Json(serde_json::json!({"status": "ignored"})).into_response();
    }
    let Some(invoice_id) = event.invoice_id.filter(|id| !id.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing invoiceId");
    };

    if let Some(provider) = &state.invoices {
        match provider.is_settled(&invoice_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(invoice_id = %invoice_id, "webhook claims settlement the provider does not confirm");
                return error_response(StatusCode::BAD_REQUEST, "Invoice not settled");
            }
            Err(e) => return payment_error_response(&e),
        }
    }

    match state.settlement.settle_by_invoice(&invoice_id, Utc::now()).await {
        Ok(job) => Json(serde_json::json!({"status": "settled", "job": job})).into_response(),
        Err(SettlementError::AlreadyPaid(job_id)) => {
            tracing::info!(invoice_id = %invoice_id, job_id = %job_id, "duplicate payment webhook");
            Json(serde_json::json!({"status": "already_settled"})).into_response()
        }
        Err(e) => {
            let outcome = SettlementOutcome::from(Err(e));
            let status = StatusCode::from_u16(outcome.status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(outcome)).into_response()
        }
    }
}
