use super::{AppState, MAX_BODY_SIZE};
use crate::security::{
    AgentRequest, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, constant_time_eq,
};
use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

/// Rate-limit key for a request: the socket peer IP, or the last
/// `X-Forwarded-For` hop when the proxy in front is trusted to set it.
pub(super) fn caller_key(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = header_str(request.headers(), "X-Forwarded-For")
            .and_then(|raw| raw.rsplit(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

fn rejection_response(status: StatusCode) -> Response {
    let message = if status == StatusCode::TOO_MANY_REQUESTS {
        "Too many requests"
    } else {
        "Unauthorized"
    };
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

/// Agent rate limit. Layered outside the body limit so an over-budget caller
/// is turned away before any of its body is read.
pub(super) async fn limit_agent_rate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !request.uri().path().starts_with("/agent/") {
        return next.run(request).await;
    }
    let caller = caller_key(&request, state.config.gateway.trust_forwarded_for);
    if let Err(rejection) = state.agent_auth.admit(&caller) {
        tracing::warn!(
            caller = %caller,
            path = %request.uri().path(),
            reason = rejection.reason(),
            "agent request rejected"
        );
        return rejection_response(StatusCode::TOO_MANY_REQUESTS);
    }
    next.run(request).await
}

/// Agent protocol guard for admitted callers. The raw body is buffered for the
/// signature check and handed on unchanged; rejections carry no sub-reason.
pub(super) async fn require_agent_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let caller = caller_key(&request, state.config.gateway.trust_forwarded_for);
    let (parts, body) = request.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, MAX_BODY_SIZE).await else {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(serde_json::json!({"error": "Request body too large"})),
        )
            .into_response();
    };

    let verdict = state.agent_auth.authenticate(
        &AgentRequest {
            method: parts.method.as_str(),
            path: parts.uri.path(),
            body: &bytes,
            timestamp: header_str(&parts.headers, TIMESTAMP_HEADER),
            nonce: header_str(&parts.headers, NONCE_HEADER),
            signature: header_str(&parts.headers, SIGNATURE_HEADER),
        },
        chrono::Utc::now().timestamp(),
    );

    if let Err(rejection) = verdict {
        tracing::warn!(
            caller = %caller,
            path = %parts.uri.path(),
            reason = rejection.reason(),
            "agent request rejected"
        );
        let status = StatusCode::from_u16(rejection.status_code())
            .unwrap_or(StatusCode::UNAUTHORIZED);
        return rejection_response(status);
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Operator guard: bearer token compared in constant time.
pub(super) async fn require_operator(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.operator_token.as_deref() else {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": "Operator access not configured"})),
        )
            .into_response();
    };

    let authorized = bearer_token(request.headers())
        .is_some_and(|token| constant_time_eq(token, expected));
    if !authorized {
        tracing::warn!(path = %request.uri().path(), "operator request rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Unauthorized"})),
        )
            .into_response();
    }

    next.run(request).await
}
