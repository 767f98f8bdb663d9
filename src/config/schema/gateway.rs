use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 3000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Allow binding to non-localhost (default: false)
    #[serde(default)]
    pub allow_public_bind: bool,
    /// Bearer token for `/admin` routes. Operator routes answer 403 while unset.
    #[serde(default)]
    pub operator_token: Option<String>,
    /// Key the agent rate limiter on the last `X-Forwarded-For` hop instead of
    /// the socket peer. Enable only behind a reverse proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            allow_public_bind: false,
            operator_token: None,
            trust_forwarded_for: false,
        }
    }
}
