//! Per-block fact extraction
//!
//! Turns a fetched block (and optionally its receipts) into the addresses
//! that moved value and the fee records of its transactions.

use crate::fee::{fee_record, FeeRecord};
use crate::types::{Block, Receipt, Transaction};
use alloy_primitives::{Address, B256, U256};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Facts derived from a single block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockFacts {
    /// Addresses that received a positive-value transfer
    pub recipients: BTreeSet<Address>,
    /// Addresses that originated a positive-value transfer
    pub senders: BTreeSet<Address>,
    /// One record per transaction whose receipt was retrieved
    pub fee_records: Vec<FeeRecord>,
}

/// Check if a transaction moves value.
///
/// Zero-value calls are interactions, not transfers, and are skipped when
/// collecting addresses.
pub fn is_value_transfer(tx: &Transaction) -> bool {
    tx.value > U256::ZERO
}

/// Extract facts from a block.
///
/// `receipts` is `None` when fee statistics are not requested. When present,
/// a transaction without a receipt is left out of the fee records.
pub fn extract(block: &Block, receipts: Option<&HashMap<B256, Receipt>>) -> BlockFacts {
    let mut facts = BlockFacts::default();

    for tx in &block.transactions {
        if is_value_transfer(tx) {
            if let Some(to) = tx.to {
                facts.recipients.insert(to);
            }
            facts.senders.insert(tx.from);
        }

        let Some(receipts) = receipts else {
            continue;
        };
        match receipts.get(&tx.hash) {
            Some(receipt) => match fee_record(tx, receipt) {
                Some(record) => facts.fee_records.push(record),
                None => debug!("TX {:?} in block {} has no gas price", tx.hash, block.number),
            },
            None => debug!("TX {:?} in block {} has no receipt", tx.hash, block.number),
        }
    }

    facts
}
