//! In-memory chain for tests.

use crate::rpc::{ChainRpc, RpcError};
use crate::types::{Block, Receipt, Transaction};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

enum Slot {
    Block(Block),
    Unfinalized,
    Broken,
}

/// Counts calls currently inside a method and the highest count seen.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A mock node serving canned blocks, receipts, and balances.
///
/// Heights without an entry are past the tip and return `None`.
pub struct MockChain {
    slots: HashMap<u64, Slot>,
    receipts: HashMap<B256, Receipt>,
    balances: HashMap<Address, U256>,
    broken_balances: HashSet<Address>,
    tip: Option<u64>,
    latency: Option<Duration>,
    block_calls: Mutex<Vec<u64>>,
    blocks_in_flight: InFlight,
    balances_in_flight: InFlight,
}

impl MockChain {
    pub fn builder() -> MockChainBuilder {
        MockChainBuilder {
            chain: MockChain {
                slots: HashMap::new(),
                receipts: HashMap::new(),
                balances: HashMap::new(),
                broken_balances: HashSet::new(),
                tip: None,
                latency: None,
                block_calls: Mutex::new(Vec::new()),
                blocks_in_flight: InFlight::default(),
                balances_in_flight: InFlight::default(),
            },
        }
    }

    /// Heights requested through `block_by_number`, in call order.
    pub fn block_calls(&self) -> Vec<u64> {
        self.block_calls.lock().unwrap().clone()
    }

    /// Most `block_by_number` calls that were running at the same time.
    pub fn peak_block_calls(&self) -> usize {
        self.blocks_in_flight.peak()
    }

    /// Most `balance` calls that were running at the same time.
    pub fn peak_balance_calls(&self) -> usize {
        self.balances_in_flight.peak()
    }
}

pub struct MockChainBuilder {
    chain: MockChain,
}

impl MockChainBuilder {
    pub fn with_block(mut self, block: Block) -> Self {
        self.chain.slots.insert(block.number, Slot::Block(block));
        self
    }

    pub fn with_unfinalized(mut self, height: u64) -> Self {
        self.chain.slots.insert(height, Slot::Unfinalized);
        self
    }

    pub fn with_broken(mut self, height: u64) -> Self {
        self.chain.slots.insert(height, Slot::Broken);
        self
    }

    pub fn with_receipt(mut self, receipt: Receipt) -> Self {
        self.chain.receipts.insert(receipt.transaction_hash, receipt);
        self
    }

    pub fn with_balance(mut self, address: Address, balance: u64) -> Self {
        self.chain.balances.insert(address, U256::from(balance));
        self
    }

    pub fn with_broken_balance(mut self, address: Address) -> Self {
        self.chain.broken_balances.insert(address);
        self
    }

    pub fn with_tip(mut self, tip: u64) -> Self {
        self.chain.tip = Some(tip);
        self
    }

    /// Delay every block and balance response so concurrent calls overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.chain.latency = Some(latency);
        self
    }

    pub fn build(self) -> MockChain {
        self.chain
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn block_number(&self) -> Result<u64, RpcError> {
        match self.tip {
            Some(tip) => Ok(tip),
            None => Ok(self.slots.keys().copied().max().unwrap_or_default()),
        }
    }

    async fn block_by_number(&self, height: u64) -> Result<Option<Block>, RpcError> {
        self.block_calls.lock().unwrap().push(height);
        let _in_flight = self.blocks_in_flight.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.slots.get(&height) {
            Some(Slot::Block(block)) => Ok(Some(block.clone())),
            Some(Slot::Unfinalized) => Err(RpcError::Unfinalized {
                code: -32000,
                message: "cannot query unfinalized data".to_string(),
            }),
            Some(Slot::Broken) => Err(RpcError::Transport("connection reset".to_string())),
            None => Ok(None),
        }
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        Ok(self.receipts.get(&hash).cloned())
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        let _in_flight = self.balances_in_flight.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.broken_balances.contains(&address) {
            return Err(RpcError::Transport("connection reset".to_string()));
        }
        Ok(self.balances.get(&address).copied().unwrap_or(U256::ZERO))
    }
}

pub fn addr(n: u8) -> Address {
    Address::from_slice(&[n; 20])
}

/// Distinct transaction hash derived from a counter.
pub fn tx_hash(n: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    B256::from_slice(&bytes)
}

pub fn transfer(n: u64, from: Address, to: Address, value: u64) -> Transaction {
    Transaction {
        hash: tx_hash(n),
        from,
        to: Some(to),
        value: U256::from(value),
        gas_price: Some(U256::from(1_000_000_000u64)),
    }
}

pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        hash: tx_hash(number.wrapping_add(1 << 32)),
        transactions,
    }
}

pub fn receipt_for(tx: &Transaction, gas_used: u64) -> Receipt {
    Receipt {
        transaction_hash: tx.hash,
        gas_used,
        effective_gas_price: None,
    }
}
