//! Block fetcher
//!
//! Thin wrapper over a shared [`ChainRpc`] handle. Holds no mutable state, so
//! clones can be moved into concurrently running block tasks.

use crate::rpc::{ChainRpc, RpcError};
use crate::types::{Block, Receipt};
use alloy_primitives::{Address, B256, U256};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct BlockFetcher {
    rpc: Arc<dyn ChainRpc>,
    receipt_concurrency: usize,
}

impl BlockFetcher {
    /// `receipt_concurrency` bounds in-flight receipt requests per block.
    pub fn new(rpc: Arc<dyn ChainRpc>, receipt_concurrency: usize) -> Self {
        Self {
            rpc,
            receipt_concurrency: receipt_concurrency.max(1),
        }
    }

    pub async fn chain_tip(&self) -> Result<u64, RpcError> {
        self.rpc.block_number().await
    }

    /// Fetch a block with transaction bodies. `Ok(None)` means the height is
    /// past the chain tip.
    pub async fn fetch(&self, height: u64) -> Result<Option<Block>, RpcError> {
        self.rpc.block_by_number(height).await
    }

    /// Fetch receipts for every transaction in `block`.
    ///
    /// Receipts that are missing or fail to load are left out of the map;
    /// the caller decides what an absent receipt means.
    pub async fn fetch_receipts(&self, block: &Block) -> HashMap<B256, Receipt> {
        let hashes: Vec<B256> = block.transactions.iter().map(|tx| tx.hash).collect();
        let rpc = Arc::clone(&self.rpc);
        let results: Vec<(B256, Result<Option<Receipt>, RpcError>)> = stream::iter(hashes)
            .map(move |hash| {
                let rpc = Arc::clone(&rpc);
                async move { (hash, rpc.transaction_receipt(hash).await) }
            })
            .buffer_unordered(self.receipt_concurrency)
            .collect()
            .await;

        let mut receipts = HashMap::with_capacity(results.len());
        for (hash, result) in results {
            match result {
                Ok(Some(receipt)) => {
                    receipts.insert(hash, receipt);
                }
                Ok(None) => debug!("No receipt for TX {:?} in block {}", hash, block.number),
                Err(e) => warn!("Failed to fetch receipt for TX {:?} in block {}: {}", hash, block.number, e),
            }
        }
        receipts
    }

    /// Balance of `address` at the latest block.
    pub async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        self.rpc.balance(address).await
    }
}
