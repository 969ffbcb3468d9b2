//! CLI implementation for chainscan
//!
//! Parses the command line and dispatches to the scan pipeline, the
//! standalone balance filter, or a single balance lookup.

use crate::config::{load_address_list, parse_address, EndHeight, Network};
use crate::fee::{scale_down, NATIVE_DECIMALS};
use crate::pipeline::{self, PipelineOptions};
use crate::report::ReportSink;
use crate::rpc::{ChainRpc, RpcClient};
use crate::scan::{BoundaryPolicy, ScanConfig, DEFAULT_CONCURRENCY};
use anyhow::{Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// EVM block range scanner
#[derive(Parser)]
#[command(name = "chainscan")]
#[command(about = "Scan a block range for active addresses and transaction fees")]
pub struct Cli {
    /// RPC endpoint URL; overrides --network
    #[arg(short, long, global = true)]
    rpc_url: Option<String>,

    /// Known network whose public endpoint to use
    #[arg(short, long, value_enum, default_value_t = Network::Camino, global = true)]
    network: Network,

    /// Per-request transport timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a block range and write address and fee reports
    Scan {
        /// First block to scan
        #[arg(long, default_value_t = 0)]
        start: u64,
        /// Last block to scan, or "latest" for the tip at scan start
        #[arg(long, default_value = "latest")]
        end: EndHeight,
        /// Block tasks in flight per wave
        #[arg(
            short,
            long,
            default_value_t = DEFAULT_CONCURRENCY,
            value_parser = RangedU64ValueParser::<usize>::new().range(1..)
        )]
        concurrency: usize,
        /// Fetch receipts and write fee statistics
        #[arg(long)]
        fees: bool,
        /// Receipt requests in flight per block
        #[arg(long, default_value_t = 8)]
        receipt_concurrency: usize,
        /// Do not query balances of discovered addresses
        #[arg(long)]
        skip_balances: bool,
        /// Keep facts from blocks above an unfinalized block in the same wave
        #[arg(long)]
        keep_wave: bool,
        /// Output directory for reports
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// Do not print the progress line
        #[arg(long)]
        no_progress: bool,
    },
    /// Keep only addresses from a list that currently hold a positive balance
    FilterBalances {
        /// File with one address per line
        input: PathBuf,
        /// Output directory for positiveBalanceAddresses.txt
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// Balance queries in flight
        #[arg(
            short,
            long,
            default_value_t = DEFAULT_CONCURRENCY,
            value_parser = RangedU64ValueParser::<usize>::new().range(1..)
        )]
        concurrency: usize,
    },
    /// Print the balance of one address
    Balance {
        /// Address (hex, with or without 0x prefix)
        address: String,
        /// Print base units instead of native display units
        #[arg(long)]
        raw: bool,
    },
}

/// Parse the command line and run the selected command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let url = cli
        .rpc_url
        .clone()
        .unwrap_or_else(|| cli.network.rpc_url().to_string());
    info!("RPC URL: {}", url);

    let client = RpcClient::with_timeout(url, Duration::from_secs(cli.timeout_secs))
        .context("Failed to create RPC client")?;
    let rpc: Arc<dyn ChainRpc> = Arc::new(client);

    match cli.command {
        Commands::Scan {
            start,
            end,
            concurrency,
            fees,
            receipt_concurrency,
            skip_balances,
            keep_wave,
            out,
            no_progress,
        } => {
            let options = PipelineOptions {
                scan: ScanConfig {
                    start,
                    end,
                    concurrency,
                    compute_fees: fees,
                    boundary: if keep_wave {
                        BoundaryPolicy::KeepWave
                    } else {
                        BoundaryPolicy::Truncate
                    },
                    show_progress: !no_progress,
                },
                receipt_concurrency,
                skip_balances,
            };
            let sink = ReportSink::create(out)?;
            let summary = pipeline::run(rpc, &options, &sink).await?;
            info!("Scan finished: {:?} after {} waves", summary.status, summary.waves.len());
        }
        Commands::FilterBalances {
            input,
            out,
            concurrency,
        } => {
            let addresses = load_address_list(&input)?;
            let sink = ReportSink::create(out)?;
            pipeline::filter_balances(rpc, addresses, concurrency, &sink).await?;
        }
        Commands::Balance { address, raw } => {
            let addr = parse_address(&address)?;
            let balance = rpc
                .balance(addr)
                .await
                .with_context(|| format!("Failed to get balance for {}", address))?;
            if raw {
                println!("{}", balance);
            } else {
                println!("{}", scale_down(balance, NATIVE_DECIMALS));
            }
        }
    }

    Ok(())
}
