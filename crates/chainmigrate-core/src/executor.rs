//! Sequential transfer execution against the settlement venue.
//!
//! All transfers draw on one relayer balance, so a batch is sent strictly one
//! item at a time. A failed item is marked `Errored` on the spot and the
//! batch moves on.

use std::sync::Arc;

use crate::conversion::DestinationAmount;
use crate::error::TransferError;
use crate::notify::{Notifier, NotifyLevel};
use crate::store::MigrationStore;
use crate::types::{PreparedTransfer, StatusUpdate};
use crate::venue::{FailureClassifier, SettlementVenue, TransferReceipt};

/// A transfer that did not go through, with its classified cause.
#[derive(Debug, Clone)]
pub struct FailedTransfer {
    pub transfer: PreparedTransfer,
    pub error: TransferError,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub successes: Vec<PreparedTransfer>,
    pub failures: Vec<FailedTransfer>,
}

pub struct TransferExecutor {
    venue: Arc<dyn SettlementVenue>,
    store: Arc<dyn MigrationStore>,
    notifier: Arc<dyn Notifier>,
    classifier: FailureClassifier,
}

impl TransferExecutor {
    pub fn new(
        venue: Arc<dyn SettlementVenue>,
        store: Arc<dyn MigrationStore>,
        notifier: Arc<dyn Notifier>,
        classifier: FailureClassifier,
    ) -> Self {
        Self {
            venue,
            store,
            notifier,
            classifier,
        }
    }

    /// Send one transfer. Dust succeeds without touching the venue.
    pub async fn send_transfer(
        &self,
        amount: &DestinationAmount,
        destination: &str,
    ) -> Result<(), TransferError> {
        if amount.is_zero() {
            return Ok(());
        }
        match self.venue.submit_transfer(amount, destination).await {
            Ok(TransferReceipt::Accepted) => Ok(()),
            Ok(TransferReceipt::Rejected { reason }) => Err(self.classifier.classify(&reason)),
            Err(e) => Err(TransferError::Other {
                reason: e.to_string(),
            }),
        }
    }

    /// Send every transfer in order, isolating per-item failures.
    pub async fn send_batch(&self, transfers: Vec<PreparedTransfer>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for transfer in transfers {
            if transfer.amount.is_zero() {
                tracing::info!(
                    tx_hash = %transfer.tx_hash,
                    "migration truncates to zero at destination precision, skipping send"
                );
            }

            match self.send_transfer(&transfer.amount, &transfer.destination).await {
                Ok(()) => {
                    tracing::debug!(tx_hash = %transfer.tx_hash, amount = %transfer.amount, "transfer sent");
                    outcome.successes.push(transfer);
                }
                Err(error) => {
                    self.notifier.notify(
                        NotifyLevel::Warn,
                        "transfer to settlement venue failed",
                        serde_json::json!({
                            "tx_hash": transfer.tx_hash,
                            "destination": transfer.destination,
                            "amount": transfer.amount.to_string(),
                            "kind": error.kind(),
                            "reason": error.to_string(),
                        }),
                    );
                    if let Err(e) = self
                        .store
                        .update_status(&transfer.tx_hash, StatusUpdate::Errored)
                        .await
                    {
                        // Still not `Sent`, so it is picked up again next tick either way.
                        tracing::error!(
                            tx_hash = %transfer.tx_hash,
                            error = %e,
                            "could not mark migration as errored"
                        );
                    }
                    outcome.failures.push(FailedTransfer { transfer, error });
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStore, FakeVenue, RecordingNotifier};
    use crate::types::{CandidateMigration, MigrationStatus};
    use alloy_primitives::U256;
    use chrono::Utc;

    fn prepared(hash: &str, dest: &str, units: u64) -> PreparedTransfer {
        PreparedTransfer {
            tx_hash: hash.into(),
            destination: dest.into(),
            amount: DestinationAmount::new(U256::from(units), 6),
        }
    }

    async fn seeded_store(hashes: &[&str]) -> Arc<FakeStore> {
        let store = Arc::new(FakeStore::default());
        let records = hashes
            .iter()
            .map(|h| {
                CandidateMigration {
                    tx_hash: h.to_string(),
                    source_contract: "0xc0".into(),
                    caller: "0xca".into(),
                    destination: "0xde".into(),
                    raw_amount: U256::from(1u64),
                    block_number: 1,
                    log_index: 0,
                }
                .into_record(Utc::now())
            })
            .collect();
        store.insert_if_absent(records).await.unwrap();
        store
    }

    fn executor(venue: Arc<FakeVenue>, store: Arc<FakeStore>) -> TransferExecutor {
        TransferExecutor::new(
            venue,
            store,
            Arc::new(RecordingNotifier::default()),
            FailureClassifier::default(),
        )
    }

    #[tokio::test]
    async fn dust_is_a_local_success() {
        let venue = Arc::new(FakeVenue::default());
        let exec = executor(venue.clone(), Arc::new(FakeStore::default()));
        let dust = DestinationAmount::new(U256::ZERO, 6);
        assert!(exec.send_transfer(&dust, "0xde").await.is_ok());
        assert!(venue.calls().is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let venue = Arc::new(FakeVenue::rejecting(
            "0xbob",
            "Insufficient balance for token transfer",
        ));
        let store = seeded_store(&["0x01", "0x02", "0x03"]).await;
        let exec = executor(venue.clone(), store.clone());

        let out = exec
            .send_batch(vec![
                prepared("0x01", "0xalice", 1_000_000),
                prepared("0x02", "0xbob", 2_000_000),
                prepared("0x03", "0xcarol", 3_000_000),
            ])
            .await;

        let sent: Vec<_> = venue.calls().into_iter().map(|(d, _)| d).collect();
        assert_eq!(sent, vec!["0xalice", "0xbob", "0xcarol"]);

        assert_eq!(out.successes.len(), 2);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].transfer.tx_hash, "0x02");
        assert!(matches!(
            out.failures[0].error,
            TransferError::InsufficientDestinationBalance { .. }
        ));
        assert_eq!(store.status_of("0x02"), Some(MigrationStatus::Errored));
        assert_eq!(store.status_of("0x01"), Some(MigrationStatus::Found));
    }

    #[tokio::test]
    async fn gas_rejection_is_classified() {
        let venue = Arc::new(FakeVenue::rejecting(
            "0xbob",
            "Insufficient USDC balance for token transfer gas",
        ));
        let store = seeded_store(&["0x02"]).await;
        let out = executor(venue, store)
            .send_batch(vec![prepared("0x02", "0xbob", 5)])
            .await;
        assert!(matches!(
            out.failures[0].error,
            TransferError::InsufficientGasBalance { .. }
        ));
    }

    #[tokio::test]
    async fn errored_write_failure_is_not_fatal() {
        let venue = Arc::new(FakeVenue::rejecting("0xbob", "boom"));
        let store = seeded_store(&["0x02", "0x03"]).await;
        store.fail_updates_for("0x02", 1);
        let out = executor(venue, store.clone())
            .send_batch(vec![prepared("0x02", "0xbob", 5), prepared("0x03", "0xcarol", 5)])
            .await;
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.successes.len(), 1);
        assert_eq!(store.status_of("0x02"), Some(MigrationStatus::Found));
    }

    #[tokio::test]
    async fn dust_in_batch_counts_as_success() {
        let venue = Arc::new(FakeVenue::default());
        let out = executor(venue.clone(), Arc::new(FakeStore::default()))
            .send_batch(vec![prepared("0x01", "0xalice", 0)])
            .await;
        assert_eq!(out.successes.len(), 1);
        assert!(venue.calls().is_empty());
    }
}
