//! Relayer configuration.

use serde::{Deserialize, Serialize};

use crate::error::MigratorError;

/// Configuration for a relayer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// First block to scan when no cursor has been persisted yet.
    #[serde(default)]
    pub start_block: u64,
    /// Blocks re-scanned behind the cursor on every tick.
    #[serde(default = "default_safety_cushion")]
    pub safety_cushion: u64,
    /// Blocks per `eth_getLogs` call (provider range limit).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Migration contracts to monitor, scanned in this order.
    #[serde(default)]
    pub contracts: Vec<String>,
    /// Source token precision; discovered on-chain when absent.
    #[serde(default)]
    pub source_decimals: Option<u8>,
    /// Destination token precision; asked from the venue when absent.
    #[serde(default)]
    pub destination_decimals: Option<u8>,
    #[serde(default)]
    pub finalize: FinalizeConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub event: EventLayout,
    /// Interval between scheduled ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_safety_cushion() -> u64 { 10 }
fn default_chunk_size() -> u64 { 500 }
fn default_poll_interval_secs() -> u64 { 60 }

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            safety_cushion: default_safety_cushion(),
            chunk_size: default_chunk_size(),
            contracts: vec![],
            source_decimals: None,
            destination_decimals: None,
            finalize: FinalizeConfig::default(),
            classifier: ClassifierConfig::default(),
            event: EventLayout::default(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl MigratorConfig {
    /// Parse a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, MigratorError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MigratorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MigratorError> {
        if self.chunk_size == 0 {
            return Err(MigratorError::Config("chunk_size must be at least 1".into()));
        }
        if self.finalize.max_rounds == 0 {
            return Err(MigratorError::Config("finalize.max_rounds must be at least 1".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(MigratorError::Config("poll_interval_secs must be at least 1".into()));
        }
        if self.contracts.is_empty() {
            return Err(MigratorError::Config("at least one migration contract is required".into()));
        }
        if self.event.indexed.len() != 3 {
            return Err(MigratorError::Config(format!(
                "event.indexed must describe 3 parameters, got {}",
                self.event.indexed.len()
            )));
        }
        Ok(())
    }
}

/// Bounded confirmation-write retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeConfig {
    /// Total rounds across the batch, first attempt included.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Fixed pause between rounds.
    #[serde(default)]
    pub backoff_ms: u64,
}

fn default_max_rounds() -> u32 { 3 }

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            backoff_ms: 0,
        }
    }
}

/// Substrings that identify venue rejection classes.
///
/// Matching is case-insensitive. Gas markers are checked first, so a message
/// matching both lists is classified as a gas shortfall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_gas_markers")]
    pub gas_markers: Vec<String>,
    #[serde(default = "default_balance_markers")]
    pub balance_markers: Vec<String>,
}

fn default_gas_markers() -> Vec<String> {
    vec!["insufficient gas".into(), "for gas".into(), "transfer gas".into()]
}

fn default_balance_markers() -> Vec<String> {
    vec!["insufficient balance".into(), "insufficient token balance".into()]
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            gas_markers: default_gas_markers(),
            balance_markers: default_balance_markers(),
        }
    }
}

/// Shape of the `MigrationRegistered(address caller, address migrationAddress, uint256 amount)` log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLayout {
    /// Canonical signature hashed into topic0.
    #[serde(default = "default_signature")]
    pub signature: String,
    /// Indexed flag for `caller`, `migrationAddress` and `amount`, in order.
    #[serde(default = "default_indexed")]
    pub indexed: Vec<bool>,
}

fn default_signature() -> String {
    "MigrationRegistered(address,address,uint256)".into()
}

fn default_indexed() -> Vec<bool> {
    vec![true, true, false]
}

impl Default for EventLayout {
    fn default() -> Self {
        Self {
            signature: default_signature(),
            indexed: default_indexed(),
        }
    }
}
