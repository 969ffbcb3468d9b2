//! Range scanner
//!
//! Drives the block range through fetch, extract, and merge in waves of at
//! most `concurrency` concurrently running tasks. A wave is fully drained
//! before the scanner decides whether to dispatch the next one.
//!
//! The scan halts after any wave in which the node rejects a height as not
//! finalized, or reports a height past its tip. A transport failure on a
//! single block is logged and the block counts as empty.

use crate::aggregate::Aggregator;
use crate::config::EndHeight;
use crate::extract::{extract, BlockFacts};
use crate::fetch::BlockFetcher;
use anyhow::{Context, Result};
use std::io::Write;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default number of block tasks in flight.
pub const DEFAULT_CONCURRENCY: usize = 30;

/// What happens to facts from heights above a halting height in the same wave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Merge the wave in height order and drop everything at or above the
    /// first unfinalized or missing height.
    #[default]
    Truncate,
    /// Merge every processed block as soon as its task finishes.
    KeepWave,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub start: u64,
    pub end: EndHeight,
    pub concurrency: usize,
    pub compute_fees: bool,
    pub boundary: BoundaryPolicy,
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start: 0,
            end: EndHeight::Latest,
            concurrency: DEFAULT_CONCURRENCY,
            compute_fees: false,
            boundary: BoundaryPolicy::default(),
            show_progress: false,
        }
    }
}

/// Result of scanning one height.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Block exists but carries no transactions
    Empty,
    Processed(BlockFacts),
    /// Height is past the chain tip
    NotFound,
    /// Node refused the height as not yet finalized
    Unfinalized,
    TransportError(String),
}

/// How a scan ended.
///
/// When one wave holds both an unfinalized and a missing height, the lower
/// one is reported. That height is also where the wave was truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// Every height up to the end height was visited.
    Completed,
    /// The node reported `height` as not finalized.
    HaltedUnfinalized { height: u64 },
    /// `height` is past the chain tip.
    HaltedExhausted { height: u64 },
}

/// Per-wave bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveReport {
    pub index: usize,
    pub first: u64,
    pub last: u64,
    pub processed: usize,
    pub empty: usize,
    pub failed: usize,
    /// Processed blocks not merged because they sit above the halting height
    pub discarded: usize,
    /// Size of the recipient set once the wave was merged
    pub recipients: usize,
    pub halt: Option<ScanStatus>,
}

#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub status: ScanStatus,
    pub start: u64,
    pub end: u64,
    pub waves: Vec<WaveReport>,
}

pub struct Scanner {
    fetcher: BlockFetcher,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(fetcher: BlockFetcher, config: ScanConfig) -> Self {
        Self { fetcher, config }
    }

    /// Resolve the configured end height, asking the node for its tip if
    /// needed.
    pub async fn resolve_end(&self) -> Result<u64> {
        match self.config.end {
            EndHeight::Fixed(end) => Ok(end),
            EndHeight::Latest => self
                .fetcher
                .chain_tip()
                .await
                .context("Failed to get latest block number"),
        }
    }

    /// Scan `[start, end]`, merging facts into `aggregator`.
    pub async fn run(&self, aggregator: Arc<Aggregator>) -> Result<ScanSummary> {
        let start = self.config.start;
        let end = self.resolve_end().await?;
        let wave_size = self.config.concurrency.max(1) as u64;

        info!(
            "Scanning blocks {} to {} ({} tasks per wave, fees: {})",
            start, end, wave_size, self.config.compute_fees
        );

        let mut waves = Vec::new();
        let mut next = start;
        let status = loop {
            if next > end {
                break ScanStatus::Completed;
            }
            let last = end.min(next.saturating_add(wave_size - 1));
            let report = self.run_wave(waves.len(), next..=last, &aggregator).await?;
            let halt = report.halt;
            waves.push(report);

            if let Some(status) = halt {
                break status;
            }
            match last.checked_add(1) {
                Some(n) => next = n,
                None => break ScanStatus::Completed,
            }
        };

        if self.config.show_progress {
            eprintln!();
        }
        match status {
            ScanStatus::Completed => info!("Scan completed through block {}", end),
            ScanStatus::HaltedUnfinalized { height } => {
                info!("Encountered unfinalized block {}. Stopping.", height)
            }
            ScanStatus::HaltedExhausted { height } => {
                info!("Block {} does not exist yet. Stopping.", height)
            }
        }

        Ok(ScanSummary {
            status,
            start,
            end,
            waves,
        })
    }

    /// Dispatch one task per height in `heights` and wait for all of them.
    async fn run_wave(
        &self,
        index: usize,
        heights: RangeInclusive<u64>,
        aggregator: &Arc<Aggregator>,
    ) -> Result<WaveReport> {
        let (first, last) = (*heights.start(), *heights.end());
        debug!("Dispatching wave {} (blocks {} to {})", index, first, last);

        let mut tasks = JoinSet::new();
        for height in heights {
            let fetcher = self.fetcher.clone();
            let aggregator = Arc::clone(aggregator);
            let compute_fees = self.config.compute_fees;
            let show_progress = self.config.show_progress;
            tasks.spawn(async move {
                let outcome = scan_block(&fetcher, height, compute_fees).await;
                let progress = aggregator.record_progress(height).await;
                if show_progress {
                    let mut stderr = std::io::stderr();
                    let _ = write!(
                        stderr,
                        "\rProcessed blocks: {} (block {})",
                        progress.resolved_blocks, progress.height
                    );
                    let _ = stderr.flush();
                }
                (height, outcome)
            });
        }

        let mut report = WaveReport {
            index,
            first,
            last,
            processed: 0,
            empty: 0,
            failed: 0,
            discarded: 0,
            recipients: 0,
            halt: None,
        };
        let mut buffered = Vec::new();
        let mut settled = Vec::new();
        let mut unfinalized: Option<u64> = None;
        let mut not_found: Option<u64> = None;

        while let Some(joined) = tasks.join_next().await {
            let (height, outcome) = joined.context("Block scan task panicked")?;
            if !matches!(outcome, ScanOutcome::Unfinalized | ScanOutcome::NotFound) {
                settled.push(height);
            }
            match outcome {
                ScanOutcome::Processed(facts) => match self.config.boundary {
                    BoundaryPolicy::KeepWave => {
                        report.processed += 1;
                        aggregator.merge_facts(facts).await;
                    }
                    BoundaryPolicy::Truncate => buffered.push((height, facts)),
                },
                ScanOutcome::Empty => report.empty += 1,
                ScanOutcome::TransportError(e) => {
                    warn!("Error processing block {}: {}", height, e);
                    report.failed += 1;
                }
                ScanOutcome::Unfinalized => {
                    warn!("Block {} is not finalized yet", height);
                    unfinalized = Some(unfinalized.map_or(height, |h| h.min(height)));
                }
                ScanOutcome::NotFound => {
                    not_found = Some(not_found.map_or(height, |h| h.min(height)));
                }
            }
        }

        report.halt = match (unfinalized, not_found) {
            (Some(u), Some(n)) if n < u => Some(ScanStatus::HaltedExhausted { height: n }),
            (Some(height), _) => Some(ScanStatus::HaltedUnfinalized { height }),
            (None, Some(height)) => Some(ScanStatus::HaltedExhausted { height }),
            (None, None) => None,
        };
        let boundary = unfinalized.into_iter().chain(not_found).min();

        if !buffered.is_empty() {
            buffered.sort_by_key(|(height, _)| *height);
            for (height, facts) in buffered {
                if boundary.is_some_and(|b| height > b) {
                    debug!("Discarding block {} above halting height", height);
                    report.discarded += 1;
                    continue;
                }
                report.processed += 1;
                aggregator.merge_facts(facts).await;
            }
        }

        let last_settled = settled
            .into_iter()
            .filter(|height| match (self.config.boundary, boundary) {
                (BoundaryPolicy::Truncate, Some(b)) => *height < b,
                _ => true,
            })
            .max();
        if let Some(height) = last_settled {
            aggregator.advance_last_height(height).await;
        }

        report.recipients = aggregator.recipient_count().await;
        debug!("Wave {} done: {:?}", index, report);
        Ok(report)
    }
}

/// Fetch and extract one block.
pub async fn scan_block(fetcher: &BlockFetcher, height: u64, compute_fees: bool) -> ScanOutcome {
    let block = match fetcher.fetch(height).await {
        Ok(Some(block)) => block,
        Ok(None) => return ScanOutcome::NotFound,
        Err(e) if e.is_unfinalized() => return ScanOutcome::Unfinalized,
        Err(e) => return ScanOutcome::TransportError(e.to_string()),
    };

    if block.transactions.is_empty() {
        return ScanOutcome::Empty;
    }

    let receipts = if compute_fees {
        Some(fetcher.fetch_receipts(&block).await)
    } else {
        None
    };
    debug!("Block {} has {} transactions", height, block.transactions.len());
    ScanOutcome::Processed(extract(&block, receipts.as_ref()))
}
