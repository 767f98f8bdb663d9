use super::Config;
use std::path::PathBuf;

fn non_empty_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Some(workspace) = non_empty_env(&["SUBRELAY_WORKSPACE"]) {
            self.workspace_dir = PathBuf::from(workspace);
        }

        if let Some(port_str) = non_empty_env(&["SUBRELAY_GATEWAY_PORT", "PORT"])
            && let Ok(port) = port_str.parse::<u16>()
        {
            self.gateway.port = port;
        }

        if let Some(host) = non_empty_env(&["SUBRELAY_GATEWAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }

        if let Some(secret) = non_empty_env(&["SUBRELAY_AGENT_SECRET"]) {
            self.agent.shared_secret = Some(secret);
        }

        if let Some(token) = non_empty_env(&["SUBRELAY_OPERATOR_TOKEN"]) {
            self.gateway.operator_token = Some(token);
        }

        if let Some(secret) = non_empty_env(&["SUBRELAY_WEBHOOK_SECRET"]) {
            self.payments.webhook_secret = Some(secret);
        }

        if let Some(key) = non_empty_env(&["SUBRELAY_BTCPAY_API_KEY"]) {
            self.payments.btcpay_api_key = Some(key);
        }
    }
}
