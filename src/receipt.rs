//! Tamper-evident receipts for completed trades.
//!
//! One canonical encoding serves both generation and verification; the two
//! call sites share `canonical_payload` so float/string formatting can never
//! drift between them. The hash proves internal consistency of the stored
//! record, nothing more: there is no external anchoring.

use sha2::{Digest, Sha256};

use crate::error::{BrokerError, BrokerResult};
use crate::model::{ItemStack, Trade};

fn encode_stacks(stacks: &[ItemStack]) -> String {
    stacks
        .iter()
        .map(|s| {
            format!(
                "{}x{}@{:.2}",
                s.item.item_id, s.quantity, s.item.value
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Deterministic encoding of exactly the fields the receipt covers, keys in
/// sorted order. Changing this format invalidates every stored receipt.
pub fn canonical_payload(trade: &Trade) -> BrokerResult<String> {
    let completed_at = trade.completed_at.ok_or_else(|| {
        BrokerError::Invariant("receipt requested for an incomplete trade".to_string())
    })?;
    let target_id = trade.target_id.ok_or_else(|| {
        BrokerError::Invariant("receipt requested for a trade without a target".to_string())
    })?;
    Ok(format!(
        "completed_at={};game={};requester_id={};requester_items={};target_id={};target_items={};trade_id={}",
        completed_at,
        trade.game.as_str(),
        trade.requester_id,
        encode_stacks(&trade.requester_items),
        target_id,
        encode_stacks(&trade.target_items),
        trade.id,
    ))
}

/// SHA-256 over the canonical payload, lowercase hex.
pub fn generate_receipt_hash(trade: &Trade) -> BrokerResult<String> {
    let payload = canonical_payload(trade)?;
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Recompute and compare. A trade that cannot produce a payload (never
/// completed) verifies false rather than erroring.
pub fn verify_receipt(trade: &Trade, claimed_hash: &str) -> bool {
    match generate_receipt_hash(trade) {
        Ok(hash) => hash == claimed_hash.to_ascii_lowercase(),
        Err(_) => false,
    }
}
