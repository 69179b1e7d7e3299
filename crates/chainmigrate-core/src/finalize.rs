//! Confirmation writes for transfers that went through.
//!
//! A transfer that succeeded on the venue but is not marked `Sent` would be
//! paid again on the next tick. Rounds are therefore bounded, and a subset
//! that still cannot be written after the last round is returned as the one
//! fatal error of the pipeline.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::FinalizeConfig;
use crate::error::MigratorError;
use crate::store::MigrationStore;
use crate::types::{PreparedTransfer, StatusUpdate};

pub struct FinalizationRetrier {
    store: Arc<dyn MigrationStore>,
    config: FinalizeConfig,
}

impl FinalizationRetrier {
    pub fn new(store: Arc<dyn MigrationStore>, config: FinalizeConfig) -> Self {
        Self { store, config }
    }

    /// Mark every transfer `Sent`, re-attempting only the failing subset each
    /// round. Returns how many were confirmed.
    pub async fn finalize(&self, confirmed: Vec<PreparedTransfer>) -> Result<usize, MigratorError> {
        let total = confirmed.len();
        let mut pending = confirmed;
        let max_rounds = self.config.max_rounds.max(1);

        for round in 1..=max_rounds {
            if pending.is_empty() {
                break;
            }
            if round > 1 && self.config.backoff_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.backoff_ms)).await;
            }

            let mut still_failing = Vec::new();
            for transfer in pending {
                let update = StatusUpdate::Sent {
                    confirmed_at: Utc::now(),
                    confirmed_amount: transfer.amount.to_string(),
                };
                match self.store.update_status(&transfer.tx_hash, update).await {
                    Ok(()) => {}
                    Err(e) => {
                        tracing::warn!(
                            tx_hash = %transfer.tx_hash,
                            round,
                            max_rounds,
                            error = %e,
                            "confirmation write failed"
                        );
                        still_failing.push(transfer);
                    }
                }
            }
            pending = still_failing;
        }

        if pending.is_empty() {
            tracing::debug!(confirmed = total, "finalized transfers");
            Ok(total)
        } else {
            tracing::error!(
                unresolved = pending.len(),
                max_rounds,
                "confirmation writes exhausted"
            );
            Err(MigratorError::FinalizationExhausted { unresolved: pending })
        }
    }
}
