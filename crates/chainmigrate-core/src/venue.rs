//! Settlement venue collaborator contract and rejection classification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::conversion::DestinationAmount;
use crate::error::{MigratorError, TransferError};

/// What the venue said about a submitted transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TransferReceipt {
    Accepted,
    Rejected { reason: String },
}

/// The off-chain venue credited by the relayer.
///
/// Adapters translate the venue SDK's loosely-typed responses into a
/// [`TransferReceipt`]; an `Err` means the request itself never completed.
#[async_trait]
pub trait SettlementVenue: Send + Sync {
    /// Send `amount` of the destination token to `destination`.
    async fn submit_transfer(
        &self,
        amount: &DestinationAmount,
        destination: &str,
    ) -> Result<TransferReceipt, MigratorError>;

    /// Precision of the destination token (its "wei decimals").
    async fn token_decimals(&self) -> Result<u8, MigratorError>;
}

/// Maps a venue rejection message onto a [`TransferError`] class.
///
/// Matching is case-insensitive substring search. Gas markers are checked
/// first because the venue's fee message also mentions a balance.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    gas_markers: Vec<String>,
    balance_markers: Vec<String>,
}

impl FailureClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            gas_markers: config.gas_markers.iter().map(|m| m.to_lowercase()).collect(),
            balance_markers: config.balance_markers.iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    pub fn classify(&self, reason: &str) -> TransferError {
        let lower = reason.to_lowercase();
        let reason = reason.to_string();
        if self.gas_markers.iter().any(|m| lower.contains(m)) {
            TransferError::InsufficientGasBalance { reason }
        } else if self.balance_markers.iter().any(|m| lower.contains(m)) {
            TransferError::InsufficientDestinationBalance { reason }
        } else {
            TransferError::Other { reason }
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
