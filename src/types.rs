use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chain records (TzKT wire shapes)
// ---------------------------------------------------------------------------

/// Level and hash of the chain head.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHead {
    pub level: i64,
    pub hash: String,
}

/// TzKT account record. Only the fields the scanner surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub alias: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub balance: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRef {
    pub address: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxParameter {
    pub entrypoint: Option<String>,
    /// Entrypoint arguments. Shape varies per contract, so this stays loose
    /// and is navigated field-by-field where needed.
    #[serde(default)]
    pub value: serde_json::Value,
}

/// One transaction record from TzKT's flattened operations listing.
/// An operation hash may cover several of these (internal transactions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Option<String>,
    /// Raw amount in mutez.
    #[serde(default)]
    pub amount: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub sender: Option<AddressRef>,
    pub target: Option<AddressRef>,
    pub parameter: Option<TxParameter>,
    /// Storage diffs attached to the transaction. The issuer buried in here
    /// has disappeared from the upstream schema before, so nothing assumes
    /// a particular shape.
    #[serde(default)]
    pub diffs: Vec<serde_json::Value>,
}

impl Transaction {
    pub fn entrypoint(&self) -> Option<&str> {
        self.parameter.as_ref()?.entrypoint.as_deref()
    }

    pub fn sender_address(&self) -> Option<&str> {
        self.sender.as_ref()?.address.as_deref()
    }

    pub fn target_address(&self) -> Option<&str> {
        self.target.as_ref()?.address.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Sale
// ---------------------------------------------------------------------------

/// One completed marketplace sale, reconstructed from the collect + transfer
/// legs of a single operation. Built by the extractor, enriched in place,
/// dispatched and discarded — never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Sale {
    /// Numeric token ID on fxhash. Absent if the transfer parameters did
    /// not match the expected shape.
    pub token_id: Option<i64>,
    /// Sale amount in tez (raw mutez / 1_000_000).
    pub amount: f64,
    pub seller_address: Option<String>,
    /// Display name; falls back to the address when no alias resolves.
    pub seller_alias: Option<String>,
    pub buyer_address: Option<String>,
    pub buyer_alias: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub token_ipfs_uri: Option<String>,
    pub token_title: Option<String>,
    pub token_author: Option<String>,
    /// Operation hash of the sale — unique within a block.
    pub operation_hash: String,
}

impl Sale {
    pub fn new(operation_hash: impl Into<String>) -> Self {
        Self {
            token_id: None,
            amount: 0.0,
            seller_address: None,
            seller_alias: None,
            buyer_address: None,
            buyer_alias: None,
            timestamp: None,
            token_ipfs_uri: None,
            token_title: None,
            token_author: None,
            operation_hash: operation_hash.into(),
        }
    }
}

/// Off-chain token metadata scraped from the marketplace site.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub ipfs_uri: Option<String>,
    /// Content hash, pulled from the tail of the ipfs URI.
    pub content_hash: Option<String>,
}
