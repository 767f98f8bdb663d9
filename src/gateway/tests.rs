use super::admin::handle_settle;
use super::auth::caller_key;
use super::handlers::{handle_health, handle_job_complete, handle_take_otp};
use super::server::is_public_bind;
use super::*;
use crate::error::PaymentError;
use crate::jobs::JobStatus;
use crate::jobs::testing::{new_job, place, seed_user};
use crate::payments::Invoice;
use crate::store::open_in_memory;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde_json::Value;
use std::sync::Mutex;

struct FakeInvoices {
    created: Mutex<Vec<(i64, String)>>,
    fail: bool,
}

#[async_trait]
impl InvoiceProvider for FakeInvoices {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_invoice(
        &self,
        amount_sats: i64,
        reference: &str,
        _memo: &str,
    ) -> Result<Invoice, PaymentError> {
        if self.fail {
            return Err(PaymentError::Status {
                status: 500,
                body: "down".into(),
            });
        }
        self.created
            .lock()
            .unwrap()
            .push((amount_sats, reference.to_string()));
        Ok(Invoice {
            id: format!("inv-{reference}"),
            checkout_link: Some("https://pay.example/i/1".into()),
        })
    }

    async fn is_settled(&self, _invoice_id: &str) -> Result<bool, PaymentError> {
        Ok(true)
    }
}

async fn test_state() -> AppState {
    let pool = open_in_memory().await.unwrap();
    seed_user(&pool, "u1", None).await;
    AppState::new(Arc::new(Config::default()), pool)
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), MAX_BODY_SIZE)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn complete_request(amount_sats: i64, invoice_id: Option<&str>) -> Json<handlers::CompleteRequest> {
    let body = serde_json::json!({"amount_sats": amount_sats, "invoice_id": invoice_id});
    Json(serde_json::from_value(body).unwrap())
}

#[test]
fn security_body_limit_is_64kb() {
    assert_eq!(MAX_BODY_SIZE, 65_536);
}

#[test]
fn security_timeout_is_30_seconds() {
    assert_eq!(REQUEST_TIMEOUT_SECS, 30);
}

#[test]
fn app_state_is_clone() {
    fn assert_clone<T: Clone>() {}
    assert_clone::<AppState>();
}

#[test]
fn loopback_hosts_are_not_public() {
    assert!(!is_public_bind("127.0.0.1"));
    assert!(!is_public_bind("localhost"));
    assert!(!is_public_bind("::1"));
    assert!(is_public_bind("0.0.0.0"));
    assert!(is_public_bind("192.168.1.10"));
}

#[test]
fn blank_secrets_are_treated_as_unset() {
    assert!(non_blank(None).is_none());
    assert!(non_blank(Some("   ")).is_none());
    assert_eq!(non_blank(Some(" tok ")).as_deref(), Some("tok"));
}

#[tokio::test]
async fn health_reports_version() {
    let response = handle_health().await.into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn default_state_has_no_secrets_or_provider() {
    let state = test_state().await;
    assert!(!state.agent_auth.is_configured());
    assert!(state.operator_token.is_none());
    assert!(state.webhook_secret.is_none());
    assert!(state.invoices.is_none());
}

#[tokio::test]
async fn complete_uses_provider_invoice() {
    let provider = Arc::new(FakeInvoices {
        created: Mutex::new(Vec::new()),
        fail: false,
    });
    let state = test_state()
        .await
        .with_invoice_provider(Some(provider.clone() as Arc<dyn InvoiceProvider>));
    let job = new_job(&state.jobs, "u1").await;
    place(&state.pool, &job.id, JobStatus::Active, Utc::now()).await;

    let response = handle_job_complete(
        State(state.clone()),
        Path(job.id.clone()),
        complete_request(2500, Some("ignored-when-provider-present")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["job"]["invoice_id"], format!("inv-{}", job.id));
    assert_eq!(body["job"]["amount_sats"], 2500);
    assert_eq!(body["checkout_link"], "https://pay.example/i/1");
    assert_eq!(
        provider.created.lock().unwrap().as_slice(),
        &[(2500, job.id.clone())]
    );
}

#[tokio::test]
async fn complete_surfaces_provider_failure_as_bad_gateway() {
    let provider = Arc::new(FakeInvoices {
        created: Mutex::new(Vec::new()),
        fail: true,
    });
    let state = test_state().await.with_invoice_provider(Some(provider as Arc<dyn InvoiceProvider>));
    let job = new_job(&state.jobs, "u1").await;
    place(&state.pool, &job.id, JobStatus::Active, Utc::now()).await;

    let response = handle_job_complete(
        State(state.clone()),
        Path(job.id.clone()),
        complete_request(2500, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let stored = state.jobs.get(&job.id).await.unwrap().unwrap();
    assert!(stored.invoice_id.is_none());
}

#[tokio::test]
async fn complete_rejects_non_positive_amount() {
    let state = test_state().await;
    let job = new_job(&state.jobs, "u1").await;

    let response = handle_job_complete(
        State(state),
        Path(job.id),
        complete_request(0, Some("inv-1")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn complete_unknown_job_is_not_found() {
    let state = test_state().await;

    let response = handle_job_complete(
        State(state),
        Path("missing".into()),
        complete_request(100, Some("inv-1")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn take_otp_unknown_job_is_not_found() {
    let state = test_state().await;
    let response = handle_take_otp(State(state), Path("missing".into())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settle_without_invoice_is_bad_request() {
    let state = test_state().await;
    let job = new_job(&state.jobs, "u1").await;
    place(&state.pool, &job.id, JobStatus::Active, Utc::now()).await;

    let response = handle_settle(State(state), Path(job.id)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["status_code"], 400);
}

#[tokio::test]
async fn second_complete_is_conflict_without_new_invoice() {
    let provider = Arc::new(FakeInvoices {
        created: Mutex::new(Vec::new()),
        fail: false,
    });
    let state = test_state()
        .await
        .with_invoice_provider(Some(provider.clone() as Arc<dyn InvoiceProvider>));
    let job = new_job(&state.jobs, "u1").await;
    place(&state.pool, &job.id, JobStatus::Active, Utc::now()).await;

    let first = handle_job_complete(
        State(state.clone()),
        Path(job.id.clone()),
        complete_request(2500, None),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = handle_job_complete(
        State(state.clone()),
        Path(job.id.clone()),
        complete_request(4000, None),
    )
    .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(provider.created.lock().unwrap().len(), 1);

    let stored = state.jobs.get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.invoice_id, Some(format!("inv-{}", job.id)));
    assert_eq!(stored.amount_sats, Some(2500));
}

fn request_from(peer: [u8; 4], forwarded_for: Option<&str>) -> axum::extract::Request {
    let mut builder = axum::http::Request::builder().uri("/agent/jobs/pending");
    if let Some(value) = forwarded_for {
        builder = builder.header("X-Forwarded-For", value);
    }
    let mut request = builder.body(axum::body::Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(axum::extract::ConnectInfo(std::net::SocketAddr::from((peer, 9000))));
    request
}

#[test]
fn caller_key_uses_peer_unless_forwarding_is_trusted() {
    let request = request_from([127, 0, 0, 1], Some("198.51.100.7, 203.0.113.5"));
    assert_eq!(caller_key(&request, false), "127.0.0.1");
    assert_eq!(caller_key(&request, true), "203.0.113.5");

    let bare = request_from([127, 0, 0, 1], None);
    assert_eq!(caller_key(&bare, true), "127.0.0.1");

    let blank = request_from([10, 0, 0, 2], Some(" "));
    assert_eq!(caller_key(&blank, true), "10.0.0.2");
}
