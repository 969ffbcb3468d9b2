//! chainscan - EVM block range scanner
//!
//! Scans a contiguous block range with bounded concurrency, collects the
//! addresses that moved value and the fees paid, and reduces them into
//! reports once the scan halts.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod extract;
pub mod fee;
pub mod fetch;
pub mod pipeline;
pub mod reduce;
pub mod report;
pub mod rpc;
pub mod scan;
pub mod types;

#[cfg(test)]
mod mock_rpc;

// Re-export the main types for convenience
pub use aggregate::{AggregateState, Aggregator};
pub use extract::BlockFacts;
pub use fee::FeeRecord;
pub use rpc::{ChainRpc, RpcClient, RpcError};
pub use scan::{BoundaryPolicy, ScanConfig, ScanOutcome, ScanStatus, ScanSummary, Scanner};
