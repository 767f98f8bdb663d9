use crate::cli::commands::{AlertsCommands, Cli, Commands, JobsCommands};
use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use subrelay::Config;
use subrelay::gateway::{AppState, run_gateway};
use subrelay::jobs::{JobStatus, JobStore};
use subrelay::monitor::{acknowledge_alert, find_stuck_jobs, list_open_alerts, run_alert_checks};
use subrelay::security::AgentSigner;
use subrelay::settlement::{SettlementEngine, SettlementOutcome};
use subrelay::store::open_pool;
use tracing::info;

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_jobs_command(command: JobsCommands, pool: SqlitePool, config: &Config) -> Result<()> {
    let now = Utc::now();
    match command {
        JobsCommands::Stuck => {
            let stuck = find_stuck_jobs(&pool, &config.monitor.staleness, now).await?;
            if stuck.is_empty() {
                println!("No stuck jobs.");
                return Ok(());
            }
            for job in &stuck {
                println!(
                    "{}  {:<14} {:>6} min  user={} service={}",
                    job.job_id, job.status, job.minutes_stuck, job.user_id, job.service_id
                );
            }
            Ok(())
        }
        JobsCommands::Settle { id } => {
            let outcome =
                SettlementOutcome::from(SettlementEngine::new(pool).settle(&id, now).await);
            print_json(&outcome)?;
            if !outcome.success {
                bail!("settlement of {id} failed with status {}", outcome.status_code);
            }
            Ok(())
        }
        JobsCommands::Renege { id } => {
            let job = SettlementEngine::new(pool).record_renege(&id, now).await?;
            print_json(&job)
        }
        JobsCommands::ForceStatus { id, status, reason } => {
            let status = parse_status(&status)?;
            let job = JobStore::new(pool)
                .force_status(&id, status, &reason, now)
                .await?;
            print_json(&job)
        }
        JobsCommands::History { id } => {
            let history = JobStore::new(pool).history(&id).await?;
            if history.is_empty() {
                bail!("job {id} not found");
            }
            print_json(&history)
        }
    }
}

fn parse_status(raw: &str) -> Result<JobStatus> {
    JobStatus::from_str(raw.trim()).map_err(|_| anyhow!("unknown status '{raw}'"))
}

async fn run_alerts_command(
    command: AlertsCommands,
    pool: SqlitePool,
    config: &Config,
) -> Result<()> {
    match command {
        AlertsCommands::Run => {
            let summary = run_alert_checks(&pool, &config.monitor, Utc::now()).await;
            print_json(&summary)
        }
        AlertsCommands::List => print_json(&list_open_alerts(&pool).await?),
        AlertsCommands::Ack { id } => {
            if !acknowledge_alert(&pool, id).await? {
                bail!("no open alert with id {id}");
            }
            println!("Alert {id} acknowledged.");
            Ok(())
        }
    }
}

pub async fn dispatch(cli: Cli, config: Arc<Config>) -> Result<()> {
    match cli.command {
        Commands::Serve => subrelay::daemon::run(config).await,

        Commands::Gateway { port, host } => {
            let mut gateway_config = (*config).clone();
            if let Some(port) = port {
                gateway_config.gateway.port = port;
            }
            if let Some(host) = host {
                gateway_config.gateway.host = host;
            }
            info!(
                host = %gateway_config.gateway.host,
                port = gateway_config.gateway.port,
                "starting gateway"
            );
            let pool = open_pool(&gateway_config).await?;
            run_gateway(AppState::new(Arc::new(gateway_config), pool)).await
        }

        Commands::Jobs { jobs_command } => {
            let pool = open_pool(&config).await?;
            run_jobs_command(jobs_command, pool, &config).await
        }

        Commands::Alerts { alerts_command } => {
            let pool = open_pool(&config).await?;
            run_alerts_command(alerts_command, pool, &config).await
        }

        Commands::Sign { method, path, body } => {
            let secret = config
                .agent
                .shared_secret
                .as_deref()
                .context("no [agent] shared_secret configured")?;
            let headers = AgentSigner::new(secret).sign(&method.to_uppercase(), &path, body.as_bytes());
            println!("X-Agent-Timestamp: {}", headers.timestamp);
            println!("X-Agent-Nonce: {}", headers.nonce);
            println!("X-Agent-Signature: {}", headers.signature);
            Ok(())
        }
    }
}
