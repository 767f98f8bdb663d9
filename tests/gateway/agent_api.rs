use super::gateway_harness::{AGENT_SECRET, GatewayTestServer, ServerOptions, json_body};
use reqwest::StatusCode;
use serde_json::{Value, json};
use subrelay::security::AgentSigner;

#[tokio::test]
async fn unsigned_agent_request_is_unauthorized() {
    let server = GatewayTestServer::start().await;

    let response = reqwest::Client::new()
        .get(server.url("/agent/jobs/pending"))
        .send()
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn signed_request_lists_pending_jobs() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_job("u1", None).await;

    let response = server.agent("GET", "/agent/jobs/pending?limit=5", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let jobs = body["jobs"].as_array().expect("jobs array");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], Value::String(job.id));
    assert_eq!(jobs[0]["status"], "pending");
}

#[tokio::test]
async fn replayed_and_tampered_requests_are_rejected() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_job("u1", None).await;
    let client = reqwest::Client::new();

    let body = serde_json::to_vec(&json!({"job_ids": [job.id]})).unwrap();
    let headers = AgentSigner::new(AGENT_SECRET).sign("POST", "/agent/jobs/claim", &body);
    let send = |payload: Vec<u8>| {
        client
            .post(server.url("/agent/jobs/claim"))
            .header("Content-Type", "application/json")
            .header("X-Agent-Timestamp", headers.timestamp.clone())
            .header("X-Agent-Nonce", headers.nonce.clone())
            .header("X-Agent-Signature", headers.signature.clone())
            .body(payload)
            .send()
    };

    let tampered = serde_json::to_vec(&json!({"job_ids": ["other"]})).unwrap();
    let response = send(tampered).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The forged attempt did not spend the nonce.
    let response = send(body.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let replay = send(body).await.unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stale_timestamp_is_rejected_with_valid_signature() {
    let server = GatewayTestServer::start().await;
    let stale = chrono::Utc::now().timestamp() - 61;
    let headers =
        AgentSigner::new(AGENT_SECRET).sign_at("GET", "/agent/jobs/pending", b"", stale, "n-1");

    let response = reqwest::Client::new()
        .get(server.url("/agent/jobs/pending"))
        .header("X-Agent-Timestamp", headers.timestamp)
        .header("X-Agent-Nonce", headers.nonce)
        .header("X-Agent-Signature", headers.signature)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rate_limit_applies_before_authentication() {
    let server = GatewayTestServer::start_with(ServerOptions {
        rate_limit_per_window: 2,
        ..ServerOptions::default()
    })
    .await;

    assert_eq!(
        server.agent("GET", "/agent/jobs/pending", None).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        server.agent("GET", "/agent/jobs/pending", None).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        server.agent("GET", "/agent/jobs/pending", None).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    let unsigned = reqwest::Client::new()
        .get(server.url("/agent/jobs/pending"))
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn over_budget_caller_with_oversized_body_gets_too_many_requests() {
    let server = GatewayTestServer::start_with(ServerOptions {
        rate_limit_per_window: 1,
        ..ServerOptions::default()
    })
    .await;
    let client = reqwest::Client::new();
    let oversized = vec![b'x'; 80_000];

    assert_eq!(
        server.agent("GET", "/agent/jobs/pending", None).await.status(),
        StatusCode::OK
    );
    let response = client
        .post(server.url("/agent/jobs/claim"))
        .header("Content-Type", "application/json")
        .body(oversized)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn oversized_body_within_budget_is_payload_too_large() {
    let server = GatewayTestServer::start().await;

    let response = reqwest::Client::new()
        .post(server.url("/agent/jobs/claim"))
        .header("Content-Type", "application/json")
        .body(vec![b'x'; 80_000])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn trusted_forwarded_for_gives_each_client_its_own_budget() {
    let server = GatewayTestServer::start_with(ServerOptions {
        rate_limit_per_window: 1,
        trust_forwarded_for: true,
        ..ServerOptions::default()
    })
    .await;
    let client = reqwest::Client::new();
    let from = |client_ip: &str| {
        client
            .get(server.url("/agent/jobs/pending"))
            .header("X-Forwarded-For", client_ip.to_string())
            .send()
    };

    // Unsigned requests: admitted callers get 401, over-budget ones 429.
    assert_eq!(from("203.0.113.1").await.unwrap().status(), StatusCode::UNAUTHORIZED);
    assert_eq!(from("203.0.113.2").await.unwrap().status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        from("203.0.113.1").await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn claim_report_complete_and_settle_flow() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_job("u1", None).await;

    let claimed = server
        .agent("POST", "/agent/jobs/claim", Some(&json!({"job_ids": [job.id, "gone"]})))
        .await;
    assert_eq!(claimed.status(), StatusCode::OK);
    let claimed = json_body(claimed).await;
    assert_eq!(claimed["jobs"].as_array().map(Vec::len), Some(1));
    assert_eq!(claimed["jobs"][0]["status"], "dispatched");

    let path = format!("/agent/jobs/{}/status", job.id);
    let active = server
        .agent("POST", &path, Some(&json!({"status": "active"})))
        .await;
    assert_eq!(active.status(), StatusCode::OK);

    let illegal = server
        .agent("POST", &path, Some(&json!({"status": "pending"})))
        .await;
    assert_eq!(illegal.status(), StatusCode::CONFLICT);

    let complete = server
        .agent(
            "POST",
            &format!("/agent/jobs/{}/complete", job.id),
            Some(&json!({"amount_sats": 3000, "invoice_id": "inv-flow"})),
        )
        .await;
    assert_eq!(complete.status(), StatusCode::OK);
    let complete = json_body(complete).await;
    assert_eq!(complete["job"]["invoice_id"], "inv-flow");
    assert_eq!(complete["job"]["status"], "active");

    let settle_path = format!("/admin/jobs/{}/settle", job.id);
    let settled = server.admin("POST", &settle_path, None).await;
    assert_eq!(settled.status(), StatusCode::OK);
    let settled = json_body(settled).await;
    assert_eq!(settled["success"], true);
    assert_eq!(settled["job"]["status"], "completed_paid");

    let again = server.admin("POST", &settle_path, None).await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    let again = json_body(again).await;
    assert_eq!(again["success"], false);
    assert_eq!(again["status_code"], 409);
}

#[tokio::test]
async fn complete_without_provider_or_invoice_is_unavailable() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_job("u1", None).await;

    let response = server
        .agent(
            "POST",
            &format!("/agent/jobs/{}/complete", job.id),
            Some(&json!({"amount_sats": 3000})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn otp_relay_round_trip() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_job("u1", None).await;
    server
        .agent("POST", "/agent/jobs/claim", Some(&json!({"job_ids": [job.id]})))
        .await;
    let status_path = format!("/agent/jobs/{}/status", job.id);
    for status in ["active", "awaiting_otp"] {
        let response = server
            .agent("POST", &status_path, Some(&json!({"status": status})))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let otp_path = format!("/agent/jobs/{}/otp", job.id);
    assert_eq!(
        server.agent("GET", &otp_path, None).await.status(),
        StatusCode::NO_CONTENT
    );

    let submitted = server
        .admin(
            "POST",
            &format!("/admin/jobs/{}/otp", job.id),
            Some(&json!({"code": "482913"})),
        )
        .await;
    assert_eq!(submitted.status(), StatusCode::OK);

    let taken = server.agent("GET", &otp_path, None).await;
    assert_eq!(taken.status(), StatusCode::OK);
    assert_eq!(json_body(taken).await["code"], "482913");

    assert_eq!(
        server.agent("GET", &otp_path, None).await.status(),
        StatusCode::NO_CONTENT
    );
}
