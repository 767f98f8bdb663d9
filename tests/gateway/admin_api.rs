use super::gateway_harness::{GatewayTestServer, ServerOptions, json_body};
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::json;
use subrelay::store::{format_ts, user_debt};

async fn backdate(server: &GatewayTestServer, job_id: &str, status: &str, minutes: i64) {
    let at = format_ts(Utc::now() - Duration::minutes(minutes));
    sqlx::query("UPDATE jobs SET status = ?, status_updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(at)
        .bind(job_id)
        .execute(&server.pool)
        .await
        .expect("job should be backdated");
}

#[tokio::test]
async fn admin_routes_require_operator_token() {
    let server = GatewayTestServer::start().await;
    let client = reqwest::Client::new();

    let missing = client
        .get(server.url("/admin/jobs/stuck"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = client
        .get(server.url("/admin/jobs/stuck"))
        .header("Authorization", "Bearer not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = server.admin("GET", "/admin/jobs/stuck", None).await;
    assert_eq!(ok.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_are_disabled_without_operator_token() {
    let server = GatewayTestServer::start_with(ServerOptions {
        operator_token: None,
        ..ServerOptions::default()
    })
    .await;

    let response = server.admin("GET", "/admin/alerts", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn force_status_requires_reason_and_records_history() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_job("u1", None).await;
    let path = format!("/admin/jobs/{}/force-status", job.id);

    let blank = server
        .admin("POST", &path, Some(&json!({"status": "failed", "reason": "  "})))
        .await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let unknown = server
        .admin("POST", &path, Some(&json!({"status": "teleported", "reason": "x"})))
        .await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let forced = server
        .admin(
            "POST",
            &path,
            Some(&json!({"status": "failed", "reason": "card expired"})),
        )
        .await;
    assert_eq!(forced.status(), StatusCode::OK);
    assert_eq!(json_body(forced).await["job"]["status"], "failed");

    let history = server
        .admin("GET", &format!("/admin/jobs/{}/history", job.id), None)
        .await;
    assert_eq!(history.status(), StatusCode::OK);
    let history = json_body(history).await;
    let entries = history["history"].as_array().expect("history array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["to_status"], "failed");
    assert_eq!(entries[1]["actor"], "operator");
    assert_eq!(entries[1]["reason"], "card expired");

    let missing = server
        .admin("GET", "/admin/jobs/no-such-job/history", None)
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settle_unknown_job_is_not_found() {
    let server = GatewayTestServer::start().await;

    let response = server
        .admin("POST", "/admin/jobs/no-such-job/settle", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["status_code"], 404);
}

#[tokio::test]
async fn renege_then_settle_clears_debt() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_invoiced_job("u1", "inv-renege", 3000).await;

    let reneged = server
        .admin("POST", &format!("/admin/jobs/{}/renege", job.id), None)
        .await;
    assert_eq!(reneged.status(), StatusCode::OK);
    assert_eq!(json_body(reneged).await["job"]["status"], "completed_reneged");
    assert_eq!(user_debt(&server.pool, "u1").await.unwrap(), Some(3000));

    let settled = server
        .admin("POST", &format!("/admin/jobs/{}/settle", job.id), None)
        .await;
    assert_eq!(settled.status(), StatusCode::OK);
    assert_eq!(json_body(settled).await["job"]["status"], "completed_eventual");
    assert_eq!(user_debt(&server.pool, "u1").await.unwrap(), Some(0));
}

#[tokio::test]
async fn stuck_jobs_surface_and_alerts_are_deduplicated() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_job("u1", None).await;
    backdate(&server, &job.id, "dispatched", 180).await;

    let stuck = server.admin("GET", "/admin/jobs/stuck", None).await;
    assert_eq!(stuck.status(), StatusCode::OK);
    let stuck = json_body(stuck).await;
    let jobs = stuck["jobs"].as_array().expect("jobs array");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["job_id"], job.id.as_str());
    assert_eq!(jobs[0]["status"], "dispatched");

    let first = json_body(server.admin("POST", "/admin/alerts/run", None).await).await;
    assert_eq!(first["stuck_jobs_found"], 1);
    let second = json_body(server.admin("POST", "/admin/alerts/run", None).await).await;
    assert_eq!(second["stuck_jobs_found"], 1);

    let open = json_body(server.admin("GET", "/admin/alerts", None).await).await;
    let stuck_alerts: Vec<_> = open["alerts"]
        .as_array()
        .expect("alerts array")
        .iter()
        .filter(|a| a["alert_type"] == "stuck_job")
        .collect();
    assert_eq!(stuck_alerts.len(), 1);

    let alert_id = stuck_alerts[0]["id"].as_i64().expect("alert id");
    let acked = server
        .admin("POST", &format!("/admin/alerts/{alert_id}/ack"), None)
        .await;
    assert_eq!(acked.status(), StatusCode::OK);
    let again = server
        .admin("POST", &format!("/admin/alerts/{alert_id}/ack"), None)
        .await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn force_status_cannot_settle_a_job() {
    let server = GatewayTestServer::start().await;
    let job = server.seed_invoiced_job("u1", "inv-forced", 1500).await;

    let forced = server
        .admin(
            "POST",
            &format!("/admin/jobs/{}/force-status", job.id),
            Some(&json!({"status": "completed_paid", "reason": "operator typo"})),
        )
        .await;
    assert_eq!(forced.status(), StatusCode::CONFLICT);

    let settled = server
        .admin("POST", &format!("/admin/jobs/{}/settle", job.id), None)
        .await;
    assert_eq!(settled.status(), StatusCode::OK);
    assert_eq!(json_body(settled).await["job"]["status"], "completed_paid");
    assert_eq!(user_debt(&server.pool, "u1").await.unwrap(), Some(0));
}
