#![allow(dead_code)]

use reqwest::StatusCode;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use subrelay::config::Config;
use subrelay::gateway::{AppState, run_gateway_with_listener};
use subrelay::jobs::{AgentReport, Job, JobAction, JobStatus, JobStore, NewJob, TriggerSource};
use subrelay::security::AgentSigner;
use subrelay::store::{NewUser, create_user, open_pool_at};
use tempfile::TempDir;

pub const AGENT_SECRET: &str = "agent-shared-secret";
pub const OPERATOR_TOKEN: &str = "operator-token";
pub const WEBHOOK_SECRET: &str = "webhook-secret";

pub struct ServerOptions {
    pub operator_token: Option<&'static str>,
    pub rate_limit_per_window: u32,
    pub trust_forwarded_for: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            operator_token: Some(OPERATOR_TOKEN),
            rate_limit_per_window: 1_000,
            trust_forwarded_for: false,
        }
    }
}

pub struct GatewayTestServer {
    port: u16,
    pub pool: SqlitePool,
    pub jobs: JobStore,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    _workspace: TempDir,
}

impl GatewayTestServer {
    pub async fn start() -> Self {
        Self::start_with(ServerOptions::default()).await
    }

    pub async fn start_with(options: ServerOptions) -> Self {
        let workspace = TempDir::new().expect("temp workspace should be created");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("ephemeral gateway listener should bind");
        let port = listener
            .local_addr()
            .expect("ephemeral gateway listener should expose local address")
            .port();

        let mut config = Config {
            workspace_dir: workspace.path().to_path_buf(),
            config_path: workspace.path().join("config.toml"),
            ..Config::default()
        };
        config.agent.shared_secret = Some(AGENT_SECRET.to_string());
        config.agent.rate_limit_per_window = options.rate_limit_per_window;
        config.gateway.operator_token = options.operator_token.map(str::to_string);
        config.gateway.trust_forwarded_for = options.trust_forwarded_for;
        config.payments.webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let pool = open_pool_at(&config.database_path(), 4, Duration::from_secs(5))
            .await
            .expect("test database should open");
        let state = AppState::new(Arc::new(config), pool.clone());

        let host = "127.0.0.1".to_string();
        let handle =
            tokio::spawn(async move { run_gateway_with_listener(&host, listener, state).await });

        wait_until_gateway_ready(port).await;

        Self {
            port,
            jobs: JobStore::new(pool.clone()),
            pool,
            handle,
            _workspace: workspace,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    pub async fn seed_job(&self, user_id: &str, email: Option<&str>) -> Job {
        create_user(
            &self.pool,
            &NewUser {
                id: user_id,
                email,
                status: "active",
            },
        )
        .await
        .expect("user should be created");
        self.jobs
            .create(
                &NewJob {
                    user_id: user_id.to_string(),
                    service_id: "netflix".to_string(),
                    action: JobAction::Cancel,
                    trigger: TriggerSource::OnDemand,
                    billing_date: None,
                },
                chrono::Utc::now(),
            )
            .await
            .expect("job should be created")
    }

    /// Job driven to `active` with an attached invoice, ready to settle.
    pub async fn seed_invoiced_job(&self, user_id: &str, invoice_id: &str, amount_sats: i64) -> Job {
        let job = self.seed_job(user_id, None).await;
        let now = chrono::Utc::now();
        self.jobs
            .claim(&[job.id.clone()], now)
            .await
            .expect("job should be claimed");
        let report = AgentReport {
            status: JobStatus::Active,
            next_outreach_at: None,
            access_end_date: None,
            billing_date: None,
            note: None,
        };
        self.jobs
            .apply_agent_report(&job.id, &report, now)
            .await
            .expect("job should become active");
        self.jobs
            .attach_invoice(&job.id, amount_sats, invoice_id, now)
            .await
            .expect("invoice should attach")
    }

    /// Signed agent request; `path` may carry a query string, which is not signed.
    pub async fn agent(&self, method: &str, path: &str, body: Option<&Value>) -> reqwest::Response {
        let bytes = body
            .map(|b| serde_json::to_vec(b).expect("body should serialize"))
            .unwrap_or_default();
        let signed_path = path.split('?').next().unwrap_or(path);
        let headers = AgentSigner::new(AGENT_SECRET).sign(method, signed_path, &bytes);

        let client = reqwest::Client::new();
        let method = reqwest::Method::from_bytes(method.as_bytes()).expect("valid method");
        let mut request = client
            .request(method, self.url(path))
            .header("X-Agent-Timestamp", headers.timestamp)
            .header("X-Agent-Nonce", headers.nonce)
            .header("X-Agent-Signature", headers.signature);
        if body.is_some() {
            request = request
                .header("Content-Type", "application/json")
                .body(bytes);
        }
        request.send().await.expect("agent request should complete")
    }

    pub async fn admin(&self, method: &str, path: &str, body: Option<&Value>) -> reqwest::Response {
        let client = reqwest::Client::new();
        let method = reqwest::Method::from_bytes(method.as_bytes()).expect("valid method");
        let mut request = client
            .request(method, self.url(path))
            .header("Authorization", format!("Bearer {OPERATOR_TOKEN}"));
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.expect("admin request should complete")
    }
}

impl Drop for GatewayTestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn wait_until_gateway_ready(port: u16) {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(200))
        .build()
        .expect("reqwest client should be built");

    for _ in 0..80 {
        let health = client
            .get(format!("http://127.0.0.1:{port}/health"))
            .send()
            .await;
        if matches!(health, Ok(resp) if resp.status() == StatusCode::OK) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("gateway did not become ready on port {port}");
}

pub fn webhook_signature(body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

pub async fn json_body(response: reqwest::Response) -> Value {
    response.json().await.expect("response should be json")
}
