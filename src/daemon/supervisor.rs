use crate::config::Config;
use crate::gateway::{AppState, run_gateway};
use anyhow::Result;
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

const MAX_RESTARTS: u32 = 10;

/// Run `run_component` forever, restarting it with exponential backoff.
///
/// Once `max_restarts` consecutive runs have ended the circuit opens and the
/// supervisor stops. `max_restarts == 0` means unlimited.
pub(super) fn spawn_component_supervisor<F, Fut>(
    name: &'static str,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
    max_restarts: u32,
    mut run_component: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);
        let mut consecutive_failures: u32 = 0;

        loop {
            tracing::info!(component = name, "daemon component starting");
            match run_component().await {
                Ok(()) => {
                    tracing::warn!(component = name, "daemon component exited unexpectedly");
                    backoff = initial_backoff_secs.max(1);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
                Err(e) => {
                    tracing::error!(component = name, error = %e, "daemon component failed");
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
            }

            if max_restarts > 0 && consecutive_failures > max_restarts {
                tracing::error!(
                    component = name,
                    max_restarts,
                    "daemon component exceeded max restarts, circuit open"
                );
                break;
            }
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

pub(super) fn spawn_supervised_components(
    config: &Arc<Config>,
    pool: &SqlitePool,
    initial_backoff: u64,
    max_backoff: u64,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    let state = AppState::new(Arc::clone(config), pool.clone());
    handles.push(spawn_component_supervisor(
        "gateway",
        initial_backoff,
        max_backoff,
        MAX_RESTARTS,
        move || {
            let state = state.clone();
            async move { run_gateway(state).await }
        },
    ));

    if config.monitor.enabled {
        let monitor_pool = pool.clone();
        let monitor_cfg = config.monitor.clone();
        handles.push(spawn_component_supervisor(
            "monitor",
            initial_backoff,
            max_backoff,
            MAX_RESTARTS,
            move || {
                let pool = monitor_pool.clone();
                let cfg = monitor_cfg.clone();
                async move { crate::monitor::run(pool, cfg).await }
            },
        ));
    } else {
        tracing::info!("monitor disabled; alert generator not supervised");
    }

    handles
}
