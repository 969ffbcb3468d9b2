//! Post-scan reduction
//!
//! Runs once the scanner has halted: filters the discovered recipients by
//! their current balance, and summarises the fee list.

use crate::fee::FeeRecord;
use crate::fetch::BlockFetcher;
use alloy_primitives::{Address, U256};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

/// Length of the fee ranking written to the reports.
pub const TOP_N: usize = 100;

/// Keep the addresses whose balance is strictly positive right now.
///
/// At most `concurrency` balance queries are in flight. A failed query drops
/// the address from the result. Output order follows input order.
pub async fn filter_positive_balances<I>(
    fetcher: &BlockFetcher,
    addresses: I,
    concurrency: usize,
) -> Vec<Address>
where
    I: IntoIterator<Item = Address>,
{
    let addresses: Vec<Address> = addresses.into_iter().collect();
    let total = addresses.len();
    info!("Checking balances of {} addresses", total);

    let positive: Vec<Address> = stream::iter(addresses)
        .map(|address| {
            let fetcher = fetcher.clone();
            async move {
                match fetcher.balance(address).await {
                    Ok(balance) => (balance > U256::ZERO).then_some(address),
                    Err(e) => {
                        warn!("Failed to get balance for {:?}: {}", address, e);
                        None
                    }
                }
            }
        })
        .buffered(concurrency.max(1))
        .filter_map(|found| async move { found })
        .collect()
        .await;

    info!("{} of {} addresses hold a positive balance", positive.len(), total);
    positive
}

/// Summary of gas prices and fees over the fee list.
///
/// Every aggregate is `None` (serialised as `null`) for an empty list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeStatistics {
    pub count: usize,
    pub avg_gas_price_gwei: Option<f64>,
    pub min_gas_price_gwei: Option<f64>,
    pub max_gas_price_gwei: Option<f64>,
    pub avg_txn_fee_eth: Option<f64>,
    pub min_txn_fee_eth: Option<f64>,
    pub max_txn_fee_eth: Option<f64>,
}

impl FeeStatistics {
    pub fn from_records(records: &[FeeRecord]) -> Self {
        let prices = Summary::over(records.iter().map(|r| r.gas_price_gwei));
        let fees = Summary::over(records.iter().map(|r| r.fee_native));
        Self {
            count: records.len(),
            avg_gas_price_gwei: prices.map(|s| s.avg),
            min_gas_price_gwei: prices.map(|s| s.min),
            max_gas_price_gwei: prices.map(|s| s.max),
            avg_txn_fee_eth: fees.map(|s| s.avg),
            min_txn_fee_eth: fees.map(|s| s.min),
            max_txn_fee_eth: fees.map(|s| s.max),
        }
    }
}

#[derive(Clone, Copy)]
struct Summary {
    avg: f64,
    min: f64,
    max: f64,
}

impl Summary {
    fn over(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| Summary {
            avg: sum / count as f64,
            min,
            max,
        })
    }
}

/// The `n` highest-fee records, highest first. Equal fees keep their
/// original relative order.
pub fn top_by_fee(records: &[FeeRecord], n: usize) -> Vec<FeeRecord> {
    let mut ranked = records.to_vec();
    ranked.sort_by(|a, b| b.fee_native.total_cmp(&a.fee_native));
    ranked.truncate(n);
    ranked
}
