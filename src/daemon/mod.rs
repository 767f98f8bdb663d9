//! Long-running process: the gateway and the alert generator under supervision.

mod supervisor;

use crate::config::Config;
use crate::store::open_pool;
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;

use supervisor::spawn_supervised_components;

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// Open the database, start supervised components and wait for Ctrl-C.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let pool = open_pool(&config).await?;
    tracing::info!(
        database = %config.database_path().display(),
        "database ready"
    );

    let handles: Vec<JoinHandle<()>> =
        spawn_supervised_components(&config, &pool, INITIAL_BACKOFF_SECS, MAX_BACKOFF_SECS);

    println!("Daemon started");
    println!(
        "   Gateway: {}:{}",
        config.gateway.host, config.gateway.port
    );
    if config.monitor.enabled {
        println!(
            "   Alert generator every {}s",
            config.monitor.interval_secs
        );
    }
    println!("   Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }
    pool.close().await;

    Ok(())
}
