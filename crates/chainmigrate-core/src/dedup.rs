//! Idempotent persistence of scanned candidates.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::error::MigratorError;
use crate::store::MigrationStore;
use crate::types::{CandidateMigration, MigrationRecord};

/// What a reconcile pass did with its candidates.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub inserted: Vec<MigrationRecord>,
    /// Hashes that were already stored (or repeated within the batch).
    pub already_known: Vec<String>,
}

/// Merges candidates into storage keyed by transaction hash.
///
/// Re-delivering a candidate that is already stored has no effect, which is
/// what lets the scan window overlap from tick to tick.
pub struct PersistenceDedup {
    store: Arc<dyn MigrationStore>,
}

impl PersistenceDedup {
    pub fn new(store: Arc<dyn MigrationStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(
        &self,
        candidates: Vec<CandidateMigration>,
    ) -> Result<ReconcileOutcome, MigratorError> {
        if candidates.is_empty() {
            return Ok(ReconcileOutcome::default());
        }

        let hashes: Vec<String> = candidates.iter().map(|c| c.tx_hash.clone()).collect();
        let existing: HashSet<String> = self.store.existing_hashes(&hashes).await?.into_iter().collect();

        let mut seen = HashSet::new();
        let mut already_known = Vec::new();
        let mut fresh = Vec::new();
        let now = Utc::now();
        for candidate in candidates {
            if existing.contains(&candidate.tx_hash) || !seen.insert(candidate.tx_hash.clone()) {
                already_known.push(candidate.tx_hash);
            } else {
                fresh.push(candidate.into_record(now));
            }
        }

        let mut inserted = Vec::new();
        if !fresh.is_empty() {
            let outcome = self.store.insert_if_absent(fresh).await?;
            inserted = outcome.inserted;
            // Lost a race between the lookup and the insert.
            already_known.extend(outcome.existing);
        }

        tracing::info!(
            inserted = inserted.len(),
            already_known = already_known.len(),
            "reconciled scanned migrations"
        );
        Ok(ReconcileOutcome {
            inserted,
            already_known,
        })
    }
}
