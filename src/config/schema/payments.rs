use serde::{Deserialize, Serialize};

/// BTCPay Server settings. Invoice creation and verification stay disabled
/// until url, store and key are all present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentsConfig {
    /// Secret for the `BTCPay-Sig` header on payment webhooks.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub btcpay_url: Option<String>,
    #[serde(default)]
    pub btcpay_store_id: Option<String>,
    #[serde(default)]
    pub btcpay_api_key: Option<String>,
}

impl PaymentsConfig {
    pub fn provider_configured(&self) -> bool {
        [&self.btcpay_url, &self.btcpay_store_id, &self.btcpay_api_key]
            .iter()
            .all(|value| value.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}
