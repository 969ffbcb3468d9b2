//! Shared scan aggregates
//!
//! [`Aggregator`] owns the address sets and fee list for one scan. It is
//! shared through an `Arc` with every block task; each operation takes the
//! internal lock once, so a merge is observed either completely or not at all.

use crate::extract::BlockFacts;
use crate::fee::FeeRecord;
use alloy_primitives::Address;
use std::collections::BTreeSet;
use tokio::sync::Mutex;

/// Point-in-time copy of the aggregates.
#[derive(Debug, Clone, Default)]
pub struct AggregateState {
    pub recipients: BTreeSet<Address>,
    pub senders: BTreeSet<Address>,
    /// Fee records in merge order
    pub fee_records: Vec<FeeRecord>,
    /// Blocks resolved so far, whatever their outcome
    pub resolved_blocks: u64,
    /// Highest height whose outcome is reflected in the aggregates
    pub last_height: Option<u64>,
}

/// Progress counters returned by [`Aggregator::record_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub resolved_blocks: u64,
    pub height: u64,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    state: Mutex<AggregateState>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union the block's address sets into the aggregates and append its fee
    /// records.
    pub async fn merge_facts(&self, facts: BlockFacts) {
        let mut state = self.state.lock().await;
        state.recipients.extend(facts.recipients);
        state.senders.extend(facts.senders);
        state.fee_records.extend(facts.fee_records);
    }

    /// Count one more resolved block.
    pub async fn record_progress(&self, height: u64) -> Progress {
        let mut state = self.state.lock().await;
        state.resolved_blocks += 1;
        Progress {
            resolved_blocks: state.resolved_blocks,
            height,
        }
    }

    /// Raise the last settled height to `height`. Lower heights are ignored.
    pub async fn advance_last_height(&self, height: u64) {
        let mut state = self.state.lock().await;
        state.last_height = Some(state.last_height.map_or(height, |h| h.max(height)));
    }

    pub async fn recipient_count(&self) -> usize {
        self.state.lock().await.recipients.len()
    }

    pub async fn snapshot(&self) -> AggregateState {
        self.state.lock().await.clone()
    }

    /// Consume the aggregator once no task holds it any more.
    pub fn into_state(self) -> AggregateState {
        self.state.into_inner()
    }
}
