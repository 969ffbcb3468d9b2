//! Configuration values and address-list loading
//!
//! Handles the scan end height, the known network endpoints, and loading
//! newline-delimited address lists.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Last height to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndHeight {
    Fixed(u64),
    /// The chain tip as reported when the scan starts
    Latest,
}

impl FromStr for EndHeight {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(EndHeight::Latest);
        }
        s.parse()
            .map(EndHeight::Fixed)
            .with_context(|| format!("End height must be a block number or 'latest', got {:?}", s))
    }
}

/// Public Camino C-Chain endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Network {
    #[default]
    Camino,
    Columbus,
    Kopernikus,
}

impl Network {
    pub fn rpc_url(self) -> &'static str {
        match self {
            Network::Camino => "https://api.camino.network/ext/bc/C/rpc",
            Network::Columbus => "https://columbus.camino.network/ext/bc/C/rpc",
            Network::Kopernikus => "https://kopernikus.camino.network/ext/bc/C/rpc",
        }
    }
}

/// Load an address list from a file.
///
/// Each line should contain one address in hex format (with or without 0x prefix).
/// Empty lines and lines starting with '#' are ignored.
pub fn load_address_list(path: &Path) -> Result<Vec<Address>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read address list: {:?}", path))?;

    let mut addresses = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let addr = parse_address(line)
            .with_context(|| format!("Invalid address on line {}: {}", line_num + 1, line))?;
        addresses.push(addr);
    }

    Ok(addresses)
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without a 0x or 0X prefix.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }

    Ok(Address::from_slice(&bytes))
}
