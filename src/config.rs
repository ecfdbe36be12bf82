use crate::error::{AppError, Result};

pub const TZKT_API_URL: &str = "https://api.tzkt.io/v1";
pub const FXHASH_SITE_URL: &str = "https://www.fxhash.xyz";
pub const TZKT_SITE_URL: &str = "https://tzkt.io";

/// fxhash marketplace contract. A sale's "collect" transaction must target this address.
pub const FXHASH_MARKETPLACE: &str = "KT1Xo5B7PNBAeynZPmca4bRh6LQow4og1Zb9";

/// Mutez per tez — raw chain amounts are recorded in this minor unit.
pub const MUTEZ_PER_TEZ: i64 = 1_000_000;

/// Transaction page limit per block query. TzKT's maximum, always above
/// any single block's transaction count, so one page covers a block.
pub const TX_PAGE_LIMIT: u32 = 10_000;

/// HTTP timeout for every outbound call (seconds). Must be finite so the
/// scheduler's cooperative stop check is always reached.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Steady-state sleep between block iterations (seconds).
pub const STEADY_POLL_SECS: u64 = 20;

/// Shorter sleep used when the head has not advanced or the feed is
/// catching up — recovers quickly from temporary stalls.
pub const CATCHUP_POLL_SECS: u64 = 10;

/// Longer sleep while no subscriptions exist — nothing to deliver to.
pub const IDLE_POLL_SECS: u64 = 30;

/// Delay between per-channel dispatches of a single sale (milliseconds).
/// Bounds burst load on the delivery sink and avoids media rate limits.
pub const DISPATCH_DELAY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub tzkt_api_url: String,
    pub fxhash_site_url: String,
    /// Marketplace contract address the collect leg must target.
    pub marketplace_contract: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Endpoint sale payloads are POSTed to (DELIVERY_WEBHOOK_URL).
    /// When unset, deliveries are logged instead of sent.
    pub delivery_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tzkt_api_url: std::env::var("TZKT_API_URL")
                .unwrap_or_else(|_| TZKT_API_URL.to_string()),
            fxhash_site_url: std::env::var("FXHASH_SITE_URL")
                .unwrap_or_else(|_| FXHASH_SITE_URL.to_string()),
            marketplace_contract: std::env::var("FXHASH_MARKETPLACE")
                .unwrap_or_else(|_| FXHASH_MARKETPLACE.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "scanner.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            delivery_webhook_url: std::env::var("DELIVERY_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }
}
