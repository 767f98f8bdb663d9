use super::gateway_harness::{GatewayTestServer, json_body, webhook_signature};
use reqwest::StatusCode;
use serde_json::json;

async fn deliver(server: &GatewayTestServer, body: &[u8], signature: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(server.url("/webhooks/payment"))
        .header("Content-Type", "application/json")
        .header("BTCPay-Sig", signature)
        .body(body.to_vec())
        .send()
        .await
        .expect("webhook request should complete")
}

#[tokio::test]
async fn bad_signature_is_rejected() {
    let server = GatewayTestServer::start().await;
    let body = serde_json::to_vec(&json!({"type": "InvoiceSettled", "invoiceId": "inv-1"})).unwrap();

    let response = deliver(&server, &body, "sha256=deadbeef").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unrelated_events_are_ignored() {
    let server = GatewayTestServer::start().await;
    let body = serde_json::to_vec(&json!({"type": "InvoiceCreated", "invoiceId": "inv-1"})).unwrap();

    let response = deliver(&server, &body, &webhook_signature(&body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ignored");
}

#[tokio::test]
async fn settled_event_settles_once() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_invoiced_job("u1", "inv-hook", 3000).await;
    let body =
        serde_json::to_vec(&json!({"type": "InvoiceSettled", "invoiceId": "inv-hook"})).unwrap();
    let signature = webhook_signature(&body);

    let first = deliver(&server, &body, &signature).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first = json_body(first).await;
    assert_eq!(first["status"], "settled");
    assert_eq!(first["job"]["id"], job.id.as_str());
    assert_eq!(first["job"]["status"], "completed_paid");

    let redelivered = deliver(&server, &body, &signature).await;
    assert_eq!(redelivered.status(), StatusCode::OK);
    assert_eq!(json_body(redelivered).await["status"], "already_settled");
}

#[tokio::test]
async fn unknown_invoice_is_not_found() {
    let server = GatewayTestServer::start().await;
    let body =
        serde_json::to_vec(&json!({"type": "InvoiceSettled", "invoiceId": "inv-missing"})).unwrap();

    let response = deliver(&server, &body, &webhook_signature(&body)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_payload_is_bad_request() {
    let server = GatewayTestServer::start().await;
    let body = b"not json";

    let response = deliver(&server, body, &webhook_signature(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
