use super::{Invoice, InvoiceProvider};
use crate::error::PaymentError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

const SETTLED_STATUS: &str = "Settled";

/// BTCPay Server Greenfield API client.
pub struct BtcPayProvider {
    base_url: String,
    store_id: String,
    api_key: Zeroizing<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceRequest<'a> {
    amount: String,
    currency: &'static str,
    metadata: InvoiceMetadata<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceMetadata<'a> {
    order_id: &'a str,
    item_desc: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    checkout_link: Option<String>,
}

impl BtcPayProvider {
    pub fn new(base_url: &str, store_id: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            store_id: store_id.to_string(),
            api_key: Zeroizing::new(api_key.to_string()),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn invoices_url(&self) -> String {
        format!("{}/api/v1/stores/{}/invoices", self.base_url, self.store_id)
    }

    fn authorization(&self) -> String {
        format!("token {}", self.api_key.as_str())
    }

    async fn read_invoice(response: reqwest::Response) -> Result<InvoiceResponse, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))
    }
}

impl std::fmt::Debug for BtcPayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtcPayProvider")
            .field("base_url", &self.base_url)
            .field("store_id", &self.store_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl InvoiceProvider for BtcPayProvider {
    fn name(&self) -> &str {
        "btcpay"
    }

    async fn create_invoice(
        &self,
        amount_sats: i64,
        reference: &str,
        memo: &str,
    ) -> Result<Invoice, PaymentError> {
        let request = CreateInvoiceRequest {
            amount: amount_sats.to_string(),
            currency: "SATS",
            metadata: InvoiceMetadata {
                order_id: reference,
                item_desc: memo,
            },
        };
        let response = self
            .client
            .post(self.invoices_url())
            .header("Authorization", self.authorization())
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        let invoice = Self::read_invoice(response).await?;
        tracing::info!(invoice_id = %invoice.id, reference, amount_sats, "invoice created");
        Ok(Invoice {
            id: invoice.id,
            checkout_link: invoice.checkout_link,
        })
    }

    async fn is_settled(&self, invoice_id: &str) -> Result<bool, PaymentError> {
        let response = self
            .client
            .get(format!("{}/{invoice_id}", self.invoices_url()))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        let invoice = Self::read_invoice(response).await?;
        Ok(invoice.status.as_deref() == Some(SETTLED_STATUS))
    }
}
