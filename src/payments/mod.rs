//! Lightning invoice capability consumed by completion and webhook handling.

mod btcpay;

pub use btcpay::BtcPayProvider;

use crate::config::PaymentsConfig;
use crate::error::PaymentError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    pub id: String,
    pub checkout_link: Option<String>,
}

#[async_trait]
pub trait InvoiceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Open an invoice for `amount_sats`. `reference` is echoed back as the order id.
    async fn create_invoice(
        &self,
        amount_sats: i64,
        reference: &str,
        memo: &str,
    ) -> Result<Invoice, PaymentError>;

    async fn is_settled(&self, invoice_id: &str) -> Result<bool, PaymentError>;
}

/// Provider from config, or `None` when payments are not set up.
pub fn create_provider(config: &PaymentsConfig) -> Option<Arc<dyn InvoiceProvider>> {
    if !config.provider_configured() {
        return None;
    }
    let (Some(url), Some(store), Some(key)) = (
        config.btcpay_url.as_deref(),
        config.btcpay_store_id.as_deref(),
        config.btcpay_api_key.as_deref(),
    ) else {
        return None;
    };
    Some(Arc::new(BtcPayProvider::new(url, store, key)))
}
