//! One complete scan run
//!
//! Probes the endpoint, scans the range, runs the post-scan stages, and
//! writes the reports.

use crate::aggregate::Aggregator;
use crate::fetch::BlockFetcher;
use crate::reduce::{filter_positive_balances, top_by_fee, FeeStatistics, TOP_N};
use crate::report::{self, ReportSink};
use crate::rpc::ChainRpc;
use crate::scan::{ScanConfig, ScanSummary, Scanner};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub scan: ScanConfig,
    /// Bounds per-block receipt requests
    pub receipt_concurrency: usize,
    /// Skip the positive-balance pass
    pub skip_balances: bool,
}

/// Run a scan and write its reports through `sink`.
pub async fn run(
    rpc: Arc<dyn ChainRpc>,
    options: &PipelineOptions,
    sink: &ReportSink,
) -> Result<ScanSummary> {
    let fetcher = BlockFetcher::new(rpc, options.receipt_concurrency);

    let tip = fetcher
        .chain_tip()
        .await
        .context("RPC endpoint is not reachable")?;
    info!("Connected. Chain tip is block {}", tip);

    let aggregator = Arc::new(Aggregator::new());
    let scanner = Scanner::new(fetcher.clone(), options.scan.clone());
    let summary = scanner.run(Arc::clone(&aggregator)).await?;
    let state = aggregator.snapshot().await;

    info!(
        "Found {} recipient and {} sender addresses, {} fee records",
        state.recipients.len(),
        state.senders.len(),
        state.fee_records.len()
    );

    sink.write_addresses(report::ALL_ADDRESSES, &state.recipients)?;
    sink.write_addresses(report::ALL_FROM_ADDRESSES, &state.senders)?;

    if !options.skip_balances {
        let positive = filter_positive_balances(
            &fetcher,
            state.recipients.iter().copied(),
            options.scan.concurrency,
        )
        .await;
        sink.write_addresses(report::POSITIVE_BALANCE_ADDRESSES, &positive)?;
    }

    if options.scan.compute_fees {
        sink.write_json(report::TRANSACTIONS, &state.fee_records)?;
        sink.write_json(report::STATISTICS, &FeeStatistics::from_records(&state.fee_records))?;
        sink.write_json(report::TOP_TRANSACTIONS, &top_by_fee(&state.fee_records, TOP_N))?;
    }

    match state.last_height {
        Some(height) => info!("Last block number: {}", height),
        None => info!("No blocks were scanned"),
    }
    Ok(summary)
}

/// Re-run only the balance filter over an existing address list.
pub async fn filter_balances(
    rpc: Arc<dyn ChainRpc>,
    addresses: Vec<Address>,
    concurrency: usize,
    sink: &ReportSink,
) -> Result<usize> {
    let fetcher = BlockFetcher::new(rpc, 1);
    let positive = filter_positive_balances(&fetcher, addresses, concurrency).await;
    sink.write_addresses(report::POSITIVE_BALANCE_ADDRESSES, &positive)?;
    Ok(positive.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_address_list, EndHeight};
    use crate::mock_rpc::{addr, block, receipt_for, transfer, MockChain};
    use crate::rpc::RpcError;
    use crate::scan::ScanStatus;
    use alloy_primitives::{B256, U256};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    fn options(concurrency: usize, compute_fees: bool) -> PipelineOptions {
        PipelineOptions {
            scan: ScanConfig {
                end: EndHeight::Fixed(4),
                concurrency,
                compute_fees,
                ..ScanConfig::default()
            },
            receipt_concurrency: 2,
            skip_balances: false,
        }
    }

    /// Blocks 0-2 pay distinct recipients, 3 is unfinalized, 4 would pay a
    /// fourth recipient.
    fn five_block_chain() -> (MockChain, Vec<crate::types::Transaction>) {
        let txs: Vec<_> = (0..5u64)
            .map(|n| transfer(n, addr(1), addr(20 + n as u8), 1_000))
            .collect();
        let mut builder = MockChain::builder()
            .with_unfinalized(3)
            .with_block(block(4, vec![txs[4].clone()]))
            .with_balance(addr(20), 10)
            .with_balance(addr(22), 1)
            .with_tip(4);
        for n in 0..3 {
            builder = builder
                .with_block(block(n as u64, vec![txs[n].clone()]))
                .with_receipt(receipt_for(&txs[n], 21000 + n as u64));
        }
        (builder.build(), txs)
    }

    #[tokio::test]
    async fn test_scan_halts_at_unfinalized_block() {
        let (chain, _) = five_block_chain();
        let chain = Arc::new(chain);
        let dir = TempDir::new().unwrap();
        let sink = ReportSink::create(dir.path()).unwrap();

        let summary = run(chain.clone(), &options(2, false), &sink).await.unwrap();

        assert_eq!(summary.status, ScanStatus::HaltedUnfinalized { height: 3 });
        assert!(!chain.block_calls().contains(&4));

        let recipients = load_address_list(&dir.path().join(report::ALL_ADDRESSES)).unwrap();
        assert_eq!(recipients, vec![addr(20), addr(21), addr(22)]);
        let senders = load_address_list(&dir.path().join(report::ALL_FROM_ADDRESSES)).unwrap();
        assert_eq!(senders, vec![addr(1)]);
        let positive =
            load_address_list(&dir.path().join(report::POSITIVE_BALANCE_ADDRESSES)).unwrap();
        assert_eq!(positive, vec![addr(20), addr(22)]);
        assert!(!dir.path().join(report::TRANSACTIONS).exists());
    }

    #[tokio::test]
    async fn test_block_past_unfinalized_not_merged_in_same_wave() {
        let (chain, _) = five_block_chain();
        let dir = TempDir::new().unwrap();
        let sink = ReportSink::create(dir.path()).unwrap();

        let summary = run(Arc::new(chain), &options(8, false), &sink).await.unwrap();

        assert_eq!(summary.status, ScanStatus::HaltedUnfinalized { height: 3 });
        let recipients = load_address_list(&dir.path().join(report::ALL_ADDRESSES)).unwrap();
        assert_eq!(recipients.len(), 3);
        assert!(!recipients.contains(&addr(24)));
    }

    #[tokio::test]
    async fn test_fee_reports_written() {
        let (chain, txs) = five_block_chain();
        let dir = TempDir::new().unwrap();
        let sink = ReportSink::create(dir.path()).unwrap();
        let options = PipelineOptions {
            skip_balances: true,
            ..options(2, true)
        };

        run(Arc::new(chain), &options, &sink).await.unwrap();

        let read = |name: &str| -> serde_json::Value {
            serde_json::from_str(&fs::read_to_string(dir.path().join(name)).unwrap()).unwrap()
        };
        assert_eq!(read(report::TRANSACTIONS).as_array().unwrap().len(), 3);
        let stats = read(report::STATISTICS);
        assert_eq!(stats["count"], 3);
        assert_eq!(stats["max_gas_price_gwei"], 1.0);
        let top = read(report::TOP_TRANSACTIONS);
        // Highest gas used pays the highest fee.
        assert_eq!(top[0]["txn_id"], format!("0x{:x}", txs[2].hash));
        assert!(!dir.path().join(report::POSITIVE_BALANCE_ADDRESSES).exists());
    }

    struct Unreachable;

    #[async_trait]
    impl ChainRpc for Unreachable {
        async fn block_number(&self) -> Result<u64, RpcError> {
            Err(RpcError::Transport("connection refused".to_string()))
        }
        async fn block_by_number(&self, _: u64) -> Result<Option<crate::types::Block>, RpcError> {
            panic!("no block may be fetched from an unreachable endpoint")
        }
        async fn transaction_receipt(&self, _: B256) -> Result<Option<crate::types::Receipt>, RpcError> {
            panic!("no receipt may be fetched from an unreachable endpoint")
        }
        async fn balance(&self, _: Address) -> Result<U256, RpcError> {
            panic!("no balance may be fetched from an unreachable endpoint")
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_aborts_before_scanning() {
        let dir = TempDir::new().unwrap();
        let sink = ReportSink::create(dir.path()).unwrap();

        let err = run(Arc::new(Unreachable), &options(2, false), &sink)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("not reachable"));
        assert!(!dir.path().join(report::ALL_ADDRESSES).exists());
    }

    #[tokio::test]
    async fn test_filter_balances_only() {
        let chain = MockChain::builder()
            .with_balance(addr(2), 3)
            .build();
        let dir = TempDir::new().unwrap();
        let sink = ReportSink::create(dir.path()).unwrap();

        let kept = filter_balances(Arc::new(chain), vec![addr(1), addr(2)], 4, &sink)
            .await
            .unwrap();
        assert_eq!(kept, 1);
        let positive =
            load_address_list(&dir.path().join(report::POSITIVE_BALANCE_ADDRESSES)).unwrap();
        assert_eq!(positive, vec![addr(2)]);
    }
}
