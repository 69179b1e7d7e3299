//! Durable migration storage contract.
//!
//! Implementations include `InMemoryStorage`, `SqliteStorage` and
//! `PostgresStorage` in `chainmigrate-storage`.

use async_trait::async_trait;

use crate::error::MigratorError;
use crate::types::{MigrationRecord, MigrationStatus, StatusUpdate};

/// Result of an insert-if-absent batch.
#[derive(Debug, Clone, Default)]
pub struct InsertOutcome {
    /// Records that were written by this call.
    pub inserted: Vec<MigrationRecord>,
    /// Hashes that were already stored and left untouched.
    pub existing: Vec<String>,
}

/// Trait for persisting migrations keyed by source transaction hash.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Which of `tx_hashes` are already stored.
    async fn existing_hashes(&self, tx_hashes: &[String]) -> Result<Vec<String>, MigratorError>;

    /// Insert every record whose hash is not yet stored, atomically.
    ///
    /// Must enforce hash uniqueness: a hash that is already present is reported
    /// under `existing` and its stored record is not modified.
    async fn insert_if_absent(
        &self,
        records: Vec<MigrationRecord>,
    ) -> Result<InsertOutcome, MigratorError>;

    /// Apply a status write to one record.
    ///
    /// Fails if the record does not exist or is already `Sent`.
    async fn update_status(&self, tx_hash: &str, update: StatusUpdate) -> Result<(), MigratorError>;

    /// Every record whose status is not `status`, oldest discovery first.
    async fn select_by_status_not_equal(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<MigrationRecord>, MigratorError>;

    async fn select_all(&self) -> Result<Vec<MigrationRecord>, MigratorError>;

    /// Records crediting `destination` (case-insensitive).
    async fn select_by_destination(
        &self,
        destination: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError>;

    /// Records emitted by `contract` (case-insensitive).
    async fn select_by_source_contract(
        &self,
        contract: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError>;
}
