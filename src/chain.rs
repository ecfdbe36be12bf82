use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{Config, HTTP_TIMEOUT_SECS, TX_PAGE_LIMIT};
use crate::error::{AppError, Result};
use crate::types::{Account, BlockHead, Transaction};

/// Read-only view of the indexing API used by the extractor and scheduler.
/// Behind a trait so the scan loop can be driven by a scripted chain in tests.
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Level and hash of the current head block.
    async fn head(&self) -> Result<BlockHead>;

    /// All applied transactions in the given block, one page.
    async fn transactions_by_block(&self, level: i64) -> Result<Vec<Transaction>>;

    /// All internal transactions sharing one operation hash.
    async fn transactions_by_hash(&self, hash: &str) -> Result<Vec<Transaction>>;
}

/// HTTP client over the TzKT API. Every call carries a bounded timeout so a
/// hung request can never stall the scan loop's cooperative stop check.
pub struct TzktClient {
    client: reqwest::Client,
    base_url: String,
}

impl TzktClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Chain(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: cfg.tzkt_api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        debug!("GET {url}");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Chain(format!("'{url}' unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Chain(format!(
                "'{url}' returned status '{status}'"
            )));
        }
        resp.json()
            .await
            .map_err(|e| AppError::Chain(format!("'{url}' returned non-JSON payload: {e}")))
    }

    /// Account lookup, surfaced through the admin API.
    pub async fn account(&self, address: &str) -> Result<Account> {
        let url = format!("{}/accounts/{address}", self.base_url);
        let value = self.get_json(&url).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Chain(format!("malformed account record for '{address}': {e}")))
    }
}

#[async_trait]
impl ChainApi for TzktClient {
    async fn head(&self) -> Result<BlockHead> {
        let url = format!("{}/head", self.base_url);
        let value = self.get_json(&url).await?;
        let head: BlockHead = serde_json::from_value(value)
            .map_err(|e| AppError::Chain(format!("malformed head payload: {e}")))?;
        if head.level <= 0 || head.hash.is_empty() {
            return Err(AppError::Chain(format!(
                "unable to pull current block: found level '{}' and hash '{}'",
                head.level, head.hash
            )));
        }
        Ok(head)
    }

    async fn transactions_by_block(&self, level: i64) -> Result<Vec<Transaction>> {
        let url = format!(
            "{}/operations/transactions?level={level}&status=applied&limit={TX_PAGE_LIMIT}",
            self.base_url
        );
        let value = self.get_json(&url).await?;
        let txns: Vec<Transaction> = serde_json::from_value(value).map_err(|e| {
            AppError::Chain(format!("malformed transaction listing for block '{level}': {e}"))
        })?;
        debug!("pulled {} applied transactions in block '{level}'", txns.len());
        Ok(txns)
    }

    async fn transactions_by_hash(&self, hash: &str) -> Result<Vec<Transaction>> {
        let url = format!("{}/operations/transactions/{hash}", self.base_url);
        let value = self.get_json(&url).await?;
        let txns: Vec<Transaction> = serde_json::from_value(value).map_err(|e| {
            AppError::Chain(format!("malformed transaction detail for '{hash}': {e}"))
        })?;
        debug!("pulled {} records for operation '{hash}'", txns.len());
        Ok(txns)
    }
}
