use super::admin::{
    handle_ack_alert, handle_force_status, handle_job_history, handle_list_alerts,
    handle_renege, handle_run_alerts, handle_settle, handle_stuck_jobs, handle_submit_otp,
};
use super::auth::{limit_agent_rate, require_agent_auth, require_operator};
use super::handlers::{
    handle_claim_jobs, handle_health, handle_job_complete, handle_job_status,
    handle_pending_jobs, handle_take_otp,
};
use super::webhook::handle_payment_webhook;
use super::{AppState, MAX_BODY_SIZE, REQUEST_TIMEOUT_SECS};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Returns true when the bind address is not a loopback address.
pub(super) fn is_public_bind(host: &str) -> bool {
    !matches!(
        host,
        "127.0.0.1" | "localhost" | "::1" | "[::1]" | "0:0:0:0:0:0:0:1"
    )
}

/// Bind the configured address and serve until the task is dropped.
pub async fn run_gateway(state: AppState) -> Result<()> {
    let host = state.config.gateway.host.clone();
    let port = state.config.gateway.port;

    // ── Security: refuse public bind without explicit opt-in ──
    if is_public_bind(&host) && !state.config.gateway.allow_public_bind {
        anyhow::bail!(
            "Refusing to bind to {host}: the agent and admin API would be exposed.\n\
             Fix: use host = \"127.0.0.1\" (default) behind a reverse proxy, or set\n\
             [gateway] allow_public_bind = true in config.toml."
        );
    }

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("parse gateway bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind gateway socket")?;

    run_gateway_with_listener(&host, listener, state).await
}

/// Run the HTTP gateway from a pre-bound listener.
pub async fn run_gateway_with_listener(
    host: &str,
    listener: tokio::net::TcpListener,
    state: AppState,
) -> Result<()> {
    let actual_port = listener
        .local_addr()
        .context("get gateway listener local address")?
        .port();
    print_gateway_banner(&format!("{host}:{actual_port}"), &state);

    let app = build_app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("serve HTTP gateway")?;

    Ok(())
}

fn print_gateway_banner(display_addr: &str, state: &AppState) {
    println!("Gateway listening on {display_addr}");
    println!("  GET  /health");
    if state.agent_auth.is_configured() {
        println!("  /agent/*  HMAC-signed agent API");
    } else {
        println!("  /agent/*  disabled (no [agent] shared_secret)");
    }
    if state.operator_token.is_some() {
        println!("  /admin/*  operator API (bearer token)");
    } else {
        println!("  /admin/*  disabled (no [gateway] operator_token)");
    }
    if state.webhook_secret.is_some() {
        println!("  POST /webhooks/payment");
    }
    if let Some(provider) = &state.invoices {
        println!("  Invoices via {}", provider.name());
    }
}

pub fn build_app(state: AppState) -> Router {
    let agent = Router::new()
        .route("/agent/jobs/pending", get(handle_pending_jobs))
        .route("/agent/jobs/claim", post(handle_claim_jobs))
        .route("/agent/jobs/{id}/status", post(handle_job_status))
        .route("/agent/jobs/{id}/complete", post(handle_job_complete))
        .route("/agent/jobs/{id}/otp", get(handle_take_otp))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_agent_auth,
        ));

    let admin = Router::new()
        .route("/admin/jobs/stuck", get(handle_stuck_jobs))
        .route("/admin/jobs/{id}/settle", post(handle_settle))
        .route("/admin/jobs/{id}/renege", post(handle_renege))
        .route("/admin/jobs/{id}/force-status", post(handle_force_status))
        .route("/admin/jobs/{id}/otp", post(handle_submit_otp))
        .route("/admin/jobs/{id}/history", get(handle_job_history))
        .route("/admin/alerts", get(handle_list_alerts))
        .route("/admin/alerts/run", post(handle_run_alerts))
        .route("/admin/alerts/{id}/ack", post(handle_ack_alert))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_operator,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .route("/webhooks/payment", post(handle_payment_webhook))
        .merge(agent)
        .merge(admin)
        .with_state(state.clone())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(middleware::from_fn_with_state(state, limit_agent_rate))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}
