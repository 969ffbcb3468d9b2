//! JSON-RPC client for EVM nodes
//!
//! Defines the [`ChainRpc`] trait the scanner depends on, the typed
//! [`RpcError`] it reports, and [`RpcClient`], the HTTP implementation.

use crate::types::{parse_hex_u256, parse_hex_u64, Block, Receipt};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Error messages a node uses to reject a height it has not finalized yet.
const UNFINALIZED_MESSAGES: &[&str] = &["cannot query unfinalized data"];

/// Failure of a single RPC call.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Network or HTTP failure; the request may not have reached the node.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The node refused to serve a height above its finalized head.
    #[error("height not finalized (code {code}): {message}")]
    Unfinalized { code: i64, message: String },

    /// Any other JSON-RPC error object returned by the node.
    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    /// The response arrived but could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RpcError {
    /// Classify a JSON-RPC error object returned by the node.
    pub fn from_error_object(error: &Value) -> Self {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());

        if UNFINALIZED_MESSAGES.iter().any(|m| message.contains(m)) {
            RpcError::Unfinalized { code, message }
        } else {
            RpcError::Node { code, message }
        }
    }

    pub fn is_unfinalized(&self) -> bool {
        matches!(self, RpcError::Unfinalized { .. })
    }
}

/// The node operations the scanner needs.
///
/// Implementations must be callable concurrently from many tasks.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current chain tip.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Block at `height` with full transaction bodies, `None` past the tip.
    async fn block_by_number(&self, height: u64) -> Result<Option<Block>, RpcError>;

    /// Receipt for a transaction, `None` if the node does not know it.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError>;

    /// Balance of `address` at the latest block, in base units.
    async fn balance(&self, address: Address) -> Result<U256, RpcError>;
}

/// JSON-RPC client for EVM nodes over HTTP.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a client whose requests fail after `timeout`.
    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self { client, url })
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("{method}: {e}")))?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(format!("{method}: {e}")))?;

        if let Some(error) = json.get("error") {
            return Err(RpcError::from_error_object(error));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| RpcError::Decode(format!("{method}: response missing 'result' field")))
    }

    fn quantity_str<'a>(method: &str, value: &'a Value) -> Result<&'a str, RpcError> {
        value
            .as_str()
            .ok_or_else(|| RpcError::Decode(format!("{method}: expected hex string, got {value}")))
    }
}

#[async_trait]
impl ChainRpc for RpcClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let s = Self::quantity_str("eth_blockNumber", &result)?;
        parse_hex_u64(s).map_err(|e| RpcError::Decode(format!("eth_blockNumber: {e}")))
    }

    async fn block_by_number(&self, height: u64) -> Result<Option<Block>, RpcError> {
        let params = json!([format!("0x{:x}", height), true]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Decode(format!("block {height}: {e}")))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        let params = json!([format!("0x{:x}", hash)]);
        let result = self.call("eth_getTransactionReceipt", params).await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Decode(format!("receipt {hash:?}: {e}")))
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        let params = json!([format!("0x{:x}", address), "latest"]);
        let result = self.call("eth_getBalance", params).await?;
        let s = Self::quantity_str("eth_getBalance", &result)?;
        tracing::debug!("RPC balance({:?}) returned raw: {}", address, s);
        parse_hex_u256(s).map_err(|e| RpcError::Decode(format!("eth_getBalance: {e}")))
    }
}
