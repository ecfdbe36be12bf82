use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{Config, FXHASH_SITE_URL, HTTP_TIMEOUT_SECS, TZKT_SITE_URL};
use crate::error::{AppError, Result};
use crate::types::Sale;

/// Destination for sale notifications, one call per (channel, sale).
/// Fire-and-forget from the scheduler's perspective: a failed delivery is
/// logged by the caller and the next recipient is still attempted.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, channel_id: i64, sale: &Sale) -> Result<()>;
}

/// Receives feed status lines ("started at block N", "stopped at block N").
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, status: &str);
}

/// Sale payload handed to the delivery endpoint: the sale itself plus the
/// marketplace/explorer links the original feed message carried.
pub fn sale_payload(channel_id: i64, sale: &Sale) -> serde_json::Value {
    let token_url = sale
        .token_id
        .map(|id| format!("{FXHASH_SITE_URL}/objkt/{id}"));
    let seller_url = sale
        .seller_address
        .as_deref()
        .map(|a| format!("{FXHASH_SITE_URL}/pkh/{a}/collection"));
    let buyer_url = sale
        .buyer_address
        .as_deref()
        .map(|a| format!("{FXHASH_SITE_URL}/pkh/{a}/collection"));
    let operation_url = format!("{TZKT_SITE_URL}/{}", sale.operation_hash);

    serde_json::json!({
        "channel_id": channel_id,
        "sale": sale,
        "amount_display": format!("{}\u{a729}", sale.amount),
        "token_url": token_url,
        "seller_url": seller_url,
        "buyer_url": buyer_url,
        "operation_url": operation_url,
    })
}

/// POSTs each sale payload to a configured webhook endpoint.
pub struct WebhookSink {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookSink {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Delivery(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    async fn deliver(&self, channel_id: i64, sale: &Sale) -> Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&sale_payload(channel_id, sale))
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("webhook unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Delivery(format!(
                "webhook rejected sale '{}' for channel '{channel_id}' with status '{status}'",
                sale.operation_hash
            )));
        }
        Ok(())
    }
}

/// Fallback sink used when no webhook endpoint is configured — sales are
/// logged instead of sent, which keeps the scan loop exercisable locally.
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, channel_id: i64, sale: &Sale) -> Result<()> {
        info!(
            channel_id,
            operation = %sale.operation_hash,
            amount = sale.amount,
            "sale dispatch (log sink): token {:?} for {}\u{a729}",
            sale.token_id,
            sale.amount,
        );
        Ok(())
    }
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, status: &str) {
        info!("sales feed {status}");
    }
}

pub fn sink_from_config(cfg: &Config) -> Result<std::sync::Arc<dyn DeliverySink>> {
    match &cfg.delivery_webhook_url {
        Some(url) => Ok(std::sync::Arc::new(WebhookSink::new(url.clone())?)),
        None => Ok(std::sync::Arc::new(LogSink)),
    }
}
