use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chain::ChainApi;
use crate::config::MUTEZ_PER_TEZ;
use crate::error::{AppError, Result};
use crate::types::{Sale, Transaction};

/// Reconstructs marketplace sales from a block's transaction set.
///
/// A sale is an operation with exactly one qualifying "collect" leg and
/// exactly one "transfer" leg. Operations with multiple legs of either
/// kind are batched multi-transfers, not simple one-to-one sales, and are
/// excluded rather than partially parsed.
pub struct SaleExtractor {
    chain: Arc<dyn ChainApi>,
    marketplace: String,
}

impl SaleExtractor {
    pub fn new(chain: Arc<dyn ChainApi>, marketplace: impl Into<String>) -> Self {
        Self {
            chain,
            marketplace: marketplace.into(),
        }
    }

    /// All confirmed sales in a block at or above `min_amount_tez`.
    ///
    /// Per-operation extraction faults (detail records missing a leg that the
    /// block listing promised) are logged and skipped — they indicate an
    /// upstream indexing inconsistency, not a reason to stop the feed.
    /// Chain failures propagate to the caller.
    pub async fn sales_in_block(&self, level: i64, min_amount_tez: i64) -> Result<Vec<Sale>> {
        let txns = self.chain.transactions_by_block(level).await?;
        let hashes = confirmed_sale_hashes(&txns, &self.marketplace, min_amount_tez);
        debug!(
            "block '{level}': {} transactions, {} confirmed sale operations",
            txns.len(),
            hashes.len()
        );

        let mut sales = Vec::with_capacity(hashes.len());
        for hash in &hashes {
            let detail = self.chain.transactions_by_hash(hash).await?;
            match build_sale(&detail, hash) {
                Ok(sale) => sales.push(sale),
                Err(AppError::Extraction(msg)) => {
                    warn!("skipping sale in block '{level}': {msg}");
                }
                Err(e) => return Err(e),
            }
        }
        info!("found {} sales in block '{level}'", sales.len());
        Ok(sales)
    }
}

/// Operation hashes in `txns` with exactly one qualifying collect leg and
/// exactly one transfer leg, in first-seen order.
///
/// A collect qualifies when it targets the marketplace contract and carries
/// at least `min_amount_tez` (compared in mutez). Deterministic over the
/// same input.
pub fn confirmed_sale_hashes(
    txns: &[Transaction],
    marketplace: &str,
    min_amount_tez: i64,
) -> Vec<String> {
    let floor_mutez = min_amount_tez.saturating_mul(MUTEZ_PER_TEZ);

    let mut collects: HashMap<&str, u32> = HashMap::new();
    let mut transfers: HashMap<&str, u32> = HashMap::new();
    for txn in txns {
        let Some(hash) = txn.hash.as_deref() else {
            continue;
        };
        match txn.entrypoint() {
            Some("collect")
                if txn.target_address() == Some(marketplace) && txn.amount >= floor_mutez =>
            {
                *collects.entry(hash).or_default() += 1;
            }
            Some("transfer") => {
                *transfers.entry(hash).or_default() += 1;
            }
            _ => {}
        }
    }

    let mut seen = HashSet::new();
    let mut confirmed = Vec::new();
    for txn in txns {
        let Some(hash) = txn.hash.as_deref() else {
            continue;
        };
        if !seen.insert(hash) {
            continue;
        }
        if collects.get(hash) == Some(&1) && transfers.get(hash) == Some(&1) {
            confirmed.push(hash.to_string());
        }
    }
    confirmed
}

/// Builds a `Sale` from the detail records of one confirmed operation.
///
/// The first collect leg supplies buyer, amount, timestamp, and (via the
/// storage diff) the seller; the transfer leg supplies only the token ID.
/// A missing collect or transfer leg here contradicts the block listing
/// and fails with `Extraction`. Missing optional fields stay `None`.
pub fn build_sale(detail: &[Transaction], hash: &str) -> Result<Sale> {
    let collect = detail.iter().find(|t| t.entrypoint() == Some("collect"));
    let transfer = detail.iter().find(|t| t.entrypoint() == Some("transfer"));
    let (Some(collect), Some(transfer)) = (collect, transfer) else {
        return Err(AppError::Extraction(format!(
            "unable to locate 'collect' and 'transfer' legs within operation '{hash}'"
        )));
    };

    let mut sale = Sale::new(hash);
    sale.seller_address = diff_issuer(collect);
    sale.buyer_address = collect.sender_address().map(str::to_string);
    sale.amount = collect.amount as f64 / MUTEZ_PER_TEZ as f64;
    sale.timestamp = collect.timestamp;
    sale.token_id = transfer_token_id(transfer);
    Ok(sale)
}

/// Seller address from the collect leg's storage diff
/// (diffs[0].content.value.issuer). The field has vanished from the
/// upstream schema before — absence is expected, not an error.
fn diff_issuer(collect: &Transaction) -> Option<String> {
    collect
        .diffs
        .first()?
        .get("content")?
        .get("value")?
        .get("issuer")?
        .as_str()
        .map(str::to_string)
}

/// Token ID from the transfer leg's first parameter entry's first
/// sub-transfer. TzKT serializes michelson naturals as strings, so both
/// string and integer forms are accepted.
fn transfer_token_id(transfer: &Transaction) -> Option<i64> {
    let token_id = transfer
        .parameter
        .as_ref()?
        .value
        .get(0)?
        .get("txs")?
        .get(0)?
        .get("token_id")?
        .clone();
    token_id
        .as_i64()
        .or_else(|| token_id.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MARKETPLACE: &str = "KT1Xo5B7PNBAeynZPmca4bRh6LQow4og1Zb9";

    fn collect_tx(hash: &str, amount_mutez: i64) -> Transaction {
        serde_json::from_value(json!({
            "hash": hash,
            "amount": amount_mutez,
            "timestamp": "2022-03-01T12:00:00Z",
            "sender": { "address": "tz1buyer" },
            "target": { "address": MARKETPLACE },
            "parameter": { "entrypoint": "collect", "value": "510027" },
            "diffs": [{
                "content": { "value": { "issuer": "tz1seller", "price": "5000000" } }
            }]
        }))
        .unwrap()
    }

    fn transfer_tx(hash: &str, token_id: &str) -> Transaction {
        serde_json::from_value(json!({
            "hash": hash,
            "amount": 0,
            "sender": { "address": "KT1gentk" },
            "target": { "address": "KT1gentk" },
            "parameter": {
                "entrypoint": "transfer",
                "value": [{
                    "from_": "tz1seller",
                    "txs": [{ "to_": "tz1buyer", "token_id": token_id, "amount": "1" }]
                }]
            }
        }))
        .unwrap()
    }

    fn plain_tx(hash: &str) -> Transaction {
        serde_json::from_value(json!({
            "hash": hash,
            "amount": 1000,
            "sender": { "address": "tz1a" },
            "target": { "address": "tz1b" }
        }))
        .unwrap()
    }

    #[test]
    fn one_collect_one_transfer_confirms() {
        let txns = vec![
            collect_tx("opA", 5_000_000),
            transfer_tx("opA", "42"),
            plain_tx("opB"),
        ];
        assert_eq!(confirmed_sale_hashes(&txns, MARKETPLACE, 0), vec!["opA"]);
    }

    #[test]
    fn two_collects_under_one_hash_are_excluded() {
        let txns = vec![
            collect_tx("opA", 5_000_000),
            collect_tx("opA", 3_000_000),
            transfer_tx("opA", "42"),
        ];
        assert!(confirmed_sale_hashes(&txns, MARKETPLACE, 0).is_empty());
    }

    #[test]
    fn two_transfers_under_one_hash_are_excluded() {
        let txns = vec![
            collect_tx("opA", 5_000_000),
            transfer_tx("opA", "42"),
            transfer_tx("opA", "43"),
        ];
        assert!(confirmed_sale_hashes(&txns, MARKETPLACE, 0).is_empty());
    }

    #[test]
    fn collect_below_minimum_does_not_qualify() {
        let txns = vec![collect_tx("opA", 5_000_000), transfer_tx("opA", "42")];
        // Floor of 10 tez = 10_000_000 mutez, above the 5 tez collect.
        assert!(confirmed_sale_hashes(&txns, MARKETPLACE, 10).is_empty());
        // Exactly at the floor qualifies.
        assert_eq!(confirmed_sale_hashes(&txns, MARKETPLACE, 5), vec!["opA"]);
    }

    #[test]
    fn collect_to_other_contract_does_not_qualify() {
        let mut collect = collect_tx("opA", 5_000_000);
        collect.target = Some(crate::types::AddressRef {
            address: Some("KT1somewhereelse".to_string()),
            alias: None,
        });
        let txns = vec![collect, transfer_tx("opA", "42")];
        assert!(confirmed_sale_hashes(&txns, MARKETPLACE, 0).is_empty());
    }

    #[test]
    fn confirmation_is_idempotent_and_ordered() {
        let txns = vec![
            collect_tx("opB", 1_000_000),
            transfer_tx("opB", "7"),
            collect_tx("opA", 5_000_000),
            transfer_tx("opA", "42"),
        ];
        let first = confirmed_sale_hashes(&txns, MARKETPLACE, 0);
        let second = confirmed_sale_hashes(&txns, MARKETPLACE, 0);
        assert_eq!(first, second);
        assert_eq!(first, vec!["opB", "opA"]);
    }

    #[test]
    fn build_sale_scales_amount_exactly() {
        let detail = vec![collect_tx("opA", 5_000_000), transfer_tx("opA", "42")];
        let sale = build_sale(&detail, "opA").unwrap();
        assert_eq!(sale.amount, 5.0);
        assert_eq!(sale.token_id, Some(42));
        assert_eq!(sale.seller_address.as_deref(), Some("tz1seller"));
        assert_eq!(sale.buyer_address.as_deref(), Some("tz1buyer"));
        assert_eq!(sale.operation_hash, "opA");
        assert!(sale.timestamp.is_some());
    }

    #[test]
    fn build_sale_without_diffs_leaves_seller_unknown() {
        let mut collect = collect_tx("opA", 2_500_000);
        collect.diffs = Vec::new();
        let detail = vec![collect, transfer_tx("opA", "9")];
        let sale = build_sale(&detail, "opA").unwrap();
        assert_eq!(sale.seller_address, None);
        assert_eq!(sale.amount, 2.5);
    }

    #[test]
    fn build_sale_missing_leg_is_extraction_error() {
        let detail = vec![collect_tx("opA", 5_000_000)];
        match build_sale(&detail, "opA") {
            Err(AppError::Extraction(_)) => {}
            other => panic!("expected Extraction error, got {other:?}"),
        }
    }

    #[test]
    fn token_id_accepts_integer_form() {
        let mut transfer = transfer_tx("opA", "0");
        transfer.parameter.as_mut().unwrap().value =
            json!([{ "txs": [{ "token_id": 123, "amount": "1" }] }]);
        let detail = vec![collect_tx("opA", 1_000_000), transfer];
        let sale = build_sale(&detail, "opA").unwrap();
        assert_eq!(sale.token_id, Some(123));
    }
}
