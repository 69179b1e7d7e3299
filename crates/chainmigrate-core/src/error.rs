//! Error types for the migration pipeline.

use thiserror::Error;

use crate::types::PreparedTransfer;

/// Errors that can occur while running the migration pipeline.
#[derive(Debug, Error)]
pub enum MigratorError {
    #[error("invalid block range: from block {from} must be before to block {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("error scanning migrations in block range {from} to {to}: {reason}")]
    Scan { from: u64, to: u64, reason: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key-value store error: {0}")]
    KeyValue(String),

    #[error("invalid conversion precision (destination {destination_decimals}, source {source_decimals}): {reason}")]
    ConversionConfig {
        destination_decimals: u8,
        source_decimals: u8,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settlement venue error: {0}")]
    Venue(String),

    #[error(
        "FATAL: {} migration(s) were transferred but could not be marked as sent; mark them manually",
        .unresolved.len()
    )]
    FinalizationExhausted { unresolved: Vec<PreparedTransfer> },
}

impl MigratorError {
    /// Returns `true` for the one condition that must halt the relayer.
    ///
    /// Every other error only aborts the current tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FinalizationExhausted { .. })
    }
}

/// Why a single transfer failed. Each class needs a different fix from the operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The relayer account does not hold enough of the destination token.
    #[error("insufficient destination token balance: {reason}")]
    InsufficientDestinationBalance { reason: String },

    /// The relayer account cannot pay the venue's transfer fee.
    #[error("insufficient gas balance: {reason}")]
    InsufficientGasBalance { reason: String },

    #[error("transfer failed: {reason}")]
    Other { reason: String },
}

impl TransferError {
    /// Short stable label, used as a structured log/notification field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientDestinationBalance { .. } => "insufficient_destination_balance",
            Self::InsufficientGasBalance { .. } => "insufficient_gas_balance",
            Self::Other { .. } => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_finalization_exhaustion_is_fatal() {
        assert!(MigratorError::FinalizationExhausted { unresolved: vec![] }.is_fatal());
        assert!(!MigratorError::InvalidRange { from: 1, to: 1 }.is_fatal());
        assert!(!MigratorError::Storage("down".into()).is_fatal());
    }

    #[test]
    fn scan_error_carries_range() {
        let err = MigratorError::Scan {
            from: 100,
            to: 599,
            reason: "timeout".into(),
        };
        assert_eq!(
            err.to_string(),
            "error scanning migrations in block range 100 to 599: timeout"
        );
    }
}
