//! Axum-based HTTP gateway for the agent, the operator and payment webhooks.
//!
//! - Request body size limits (64KB max)
//! - Request timeouts (30s) to prevent slow-loris attacks
//! - Agent routes behind the HMAC protocol, admin routes behind a bearer token

mod admin;
mod auth;
mod handlers;
mod server;
mod webhook;

pub use server::{build_app, run_gateway, run_gateway_with_listener};

use crate::config::Config;
use crate::jobs::JobStore;
use crate::payments::{InvoiceProvider, create_provider};
use crate::security::{AgentAuthenticator, ReplayCache, SlidingWindowLimiter};
use crate::settlement::SettlementEngine;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Maximum request body size (64KB) -- prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s) -- prevents slow-loris attacks
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub jobs: JobStore,
    pub settlement: SettlementEngine,
    pub agent_auth: Arc<AgentAuthenticator>,
    pub invoices: Option<Arc<dyn InvoiceProvider>>,
    pub webhook_secret: Option<Arc<str>>,
    pub operator_token: Option<Arc<str>>,
}

impl AppState {
    /// Wire the gateway from config: fresh replay cache and limiter, provider if configured.
    pub fn new(config: Arc<Config>, pool: SqlitePool) -> Self {
        let agent = &config.agent;
        let replay = Arc::new(ReplayCache::with_limits(
            Duration::from_secs(agent.nonce_ttl_secs),
            agent.nonce_capacity,
        ));
        let limiter = Arc::new(SlidingWindowLimiter::new(
            agent.rate_limit_per_window,
            Duration::from_secs(agent.rate_limit_window_secs),
        ));
        let agent_auth = Arc::new(AgentAuthenticator::new(
            agent.shared_secret.as_deref(),
            agent.timestamp_window_secs,
            replay,
            limiter,
        ));

        Self {
            invoices: create_provider(&config.payments),
            webhook_secret: non_blank(config.payments.webhook_secret.as_deref()),
            operator_token: non_blank(config.gateway.operator_token.as_deref()),
            jobs: JobStore::new(pool.clone()),
            settlement: SettlementEngine::new(pool.clone()),
            agent_auth,
            pool,
            config,
        }
    }

    /// Replace the invoice provider (tests, alternative backends).
    pub fn with_invoice_provider(mut self, provider: Option<Arc<dyn InvoiceProvider>>) -> Self {
        self.invoices = provider;
        self
    }
}

fn non_blank(value: Option<&str>) -> Option<Arc<str>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Arc::from)
}

#[cfg(test)]
mod tests;
