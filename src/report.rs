//! Report files
//!
//! Writes address lists as newline-delimited text and everything else as
//! pretty-printed JSON into one output directory.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

pub const ALL_ADDRESSES: &str = "allAddresses.txt";
pub const ALL_FROM_ADDRESSES: &str = "allFromAddresses.txt";
pub const POSITIVE_BALANCE_ADDRESSES: &str = "positiveBalanceAddresses.txt";
pub const TRANSACTIONS: &str = "transactions.json";
pub const STATISTICS: &str = "statistics.json";
pub const TOP_TRANSACTIONS: &str = "top100Transactions.json";

pub struct ReportSink {
    dir: PathBuf,
}

impl ReportSink {
    /// Use `dir` as the output directory, creating it if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;
        Ok(Self { dir })
    }

    /// Write one lowercase `0x` address per line.
    pub fn write_addresses<'a, I>(&self, name: &str, addresses: I) -> Result<PathBuf>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        let body = addresses
            .into_iter()
            .map(|addr| format!("0x{:x}", addr))
            .collect::<Vec<_>>()
            .join("\n");
        self.write(name, body)
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let body = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {}", name))?;
        self.write(name, body)
    }

    fn write(&self, name: &str, body: String) -> Result<PathBuf> {
        let path = self.dir.join(name);
        fs::write(&path, body).with_context(|| format!("Failed to write {:?}", path))?;
        info!("Saved {:?}", path);
        Ok(path)
    }
}
