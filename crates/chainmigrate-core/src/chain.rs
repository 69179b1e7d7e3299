//! Source-chain collaborator contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MigratorError;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(rename = "data")]
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(rename = "removed", default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> Result<u64, MigratorError> {
        parse_hex_u64(&self.block_number)
    }

    pub fn log_index_u32(&self) -> Result<u32, MigratorError> {
        let index = parse_hex_u64(&self.log_index)?;
        u32::try_from(index).map_err(|_| MigratorError::Decode(format!("log index {index} out of range")))
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Which logs a scan asks the provider for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// topic[0]: keccak256 of the event signature.
    pub topic0: String,
}

/// The chain RPC provider, narrowed to what the relayer needs.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current head block number.
    async fn current_height(&self) -> Result<u64, MigratorError>;

    /// Logs emitted by `contract` in `[from, to]` (inclusive) matching `filter`.
    ///
    /// Callers keep `to - from` under the provider's range cap.
    async fn event_logs(
        &self,
        contract: &str,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, MigratorError>;

    /// Read-only contract call (`eth_call` at `latest`), returning raw return data.
    async fn call(&self, to: &str, calldata: &[u8]) -> Result<Vec<u8>, MigratorError>;
}

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, MigratorError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| MigratorError::Decode(format!("invalid hex quantity '{s}': {e}")))
}
