//! In-memory storage backend.
//!
//! Holds migrations and the two key-value entries in RAM. Useful for tests
//! and dry runs; everything is lost when the process exits.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use indexmap::IndexMap;

use chainmigrate_core::error::MigratorError;
use chainmigrate_core::kv::KeyValueStore;
use chainmigrate_core::store::{InsertOutcome, MigrationStore};
use chainmigrate_core::types::{MigrationRecord, MigrationStatus, StatusUpdate};

/// In-memory migration storage, keyed by tx hash in discovery order.
#[derive(Default)]
pub struct InMemoryStorage {
    migrations: Mutex<IndexMap<String, MigrationRecord>>,
    kv: Mutex<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn migrations(&self) -> Result<MutexGuard<'_, IndexMap<String, MigrationRecord>>, MigratorError> {
        self.migrations
            .lock()
            .map_err(|_| MigratorError::Storage("migration table lock poisoned".into()))
    }

    fn filtered<F>(&self, keep: F) -> Result<Vec<MigrationRecord>, MigratorError>
    where
        F: Fn(&MigrationRecord) -> bool,
    {
        Ok(self.migrations()?.values().filter(|r| keep(r)).cloned().collect())
    }
}

#[async_trait]
impl MigrationStore for InMemoryStorage {
    async fn existing_hashes(&self, tx_hashes: &[String]) -> Result<Vec<String>, MigratorError> {
        let migrations = self.migrations()?;
        Ok(tx_hashes
            .iter()
            .filter(|h| migrations.contains_key(h.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_if_absent(
        &self,
        records: Vec<MigrationRecord>,
    ) -> Result<InsertOutcome, MigratorError> {
        let mut migrations = self.migrations()?;
        let mut outcome = InsertOutcome::default();
        for record in records {
            if migrations.contains_key(&record.tx_hash) {
                outcome.existing.push(record.tx_hash);
            } else {
                migrations.insert(record.tx_hash.clone(), record.clone());
                outcome.inserted.push(record);
            }
        }
        Ok(outcome)
    }

    async fn update_status(&self, tx_hash: &str, update: StatusUpdate) -> Result<(), MigratorError> {
        let mut migrations = self.migrations()?;
        let record = migrations
            .get_mut(tx_hash)
            .ok_or_else(|| MigratorError::Storage(format!("no migration with tx hash {tx_hash}")))?;
        update.apply_to(record)
    }

    async fn select_by_status_not_equal(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.filtered(|r| r.status != status)
    }

    async fn select_all(&self) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.filtered(|_| true)
    }

    async fn select_by_destination(
        &self,
        destination: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.filtered(|r| r.destination.eq_ignore_ascii_case(destination))
    }

    async fn select_by_source_contract(
        &self,
        contract: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.filtered(|r| r.source_contract.eq_ignore_ascii_case(contract))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, MigratorError> {
        let kv = self
            .kv
            .lock()
            .map_err(|_| MigratorError::KeyValue("key-value lock poisoned".into()))?;
        Ok(kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), MigratorError> {
        let mut kv = self
            .kv
            .lock()
            .map_err(|_| MigratorError::KeyValue("key-value lock poisoned".into()))?;
        kv.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use chainmigrate_core::kv::SCAN_CURSOR_KEY;
    use chrono::Utc;

    #[tokio::test]
    async fn insert_is_idempotent() {
        let store = InMemoryStorage::new();
        let first = store.insert_if_absent(vec![record("0x01", "0xAA")]).await.unwrap();
        assert_eq!(first.inserted.len(), 1);

        let second = store
            .insert_if_absent(vec![record("0x01", "0xAA"), record("0x02", "0xBB")])
            .await
            .unwrap();
        assert_eq!(second.inserted.len(), 1);
        assert_eq!(second.existing, vec!["0x01".to_string()]);
        assert_eq!(store.select_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unsent_in_discovery_order() {
        let store = InMemoryStorage::new();
        store
            .insert_if_absent(vec![record("0x02", "0xAA"), record("0x01", "0xBB"), record("0x03", "0xCC")])
            .await
            .unwrap();
        store
            .update_status(
                "0x01",
                StatusUpdate::Sent {
                    confirmed_at: Utc::now(),
                    confirmed_amount: "1.000000".into(),
                },
            )
            .await
            .unwrap();
        store.update_status("0x03", StatusUpdate::Errored).await.unwrap();

        let pending = store.select_by_status_not_equal(MigrationStatus::Sent).await.unwrap();
        let hashes: Vec<_> = pending.iter().map(|r| r.tx_hash.as_str()).collect();
        assert_eq!(hashes, vec!["0x02", "0x03"]);
    }

    #[tokio::test]
    async fn sent_is_terminal() {
        let store = InMemoryStorage::new();
        store.insert_if_absent(vec![record("0x01", "0xAA")]).await.unwrap();
        let sent = StatusUpdate::Sent {
            confirmed_at: Utc::now(),
            confirmed_amount: "1.000000".into(),
        };
        store.update_status("0x01", sent.clone()).await.unwrap();
        assert!(store.update_status("0x01", StatusUpdate::Errored).await.is_err());
        assert!(store.update_status("0xmissing", StatusUpdate::Errored).await.is_err());
    }

    #[tokio::test]
    async fn reconfirming_sent_is_a_no_op() {
        let store = InMemoryStorage::new();
        store.insert_if_absent(vec![record("0x01", "0xAA")]).await.unwrap();
        let first = Utc::now();
        let sent = |at| StatusUpdate::Sent {
            confirmed_at: at,
            confirmed_amount: "1.000000".into(),
        };
        store.update_status("0x01", sent(first)).await.unwrap();
        store
            .update_status("0x01", sent(first + chrono::Duration::seconds(1)))
            .await
            .unwrap();
        let all = store.select_all().await.unwrap();
        assert_eq!(all[0].status, MigrationStatus::Sent);
        assert_eq!(all[0].confirmed_at, Some(first));
    }

    #[tokio::test]
    async fn lookups_ignore_case() {
        let store = InMemoryStorage::new();
        store
            .insert_if_absent(vec![record("0x01", "0xAbC"), record("0x02", "0xdef")])
            .await
            .unwrap();
        assert_eq!(store.select_by_destination("0xabc").await.unwrap().len(), 1);
        assert_eq!(store.select_by_source_contract("0XC0").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn kv_roundtrip() {
        let store = InMemoryStorage::new();
        assert!(store.get(SCAN_CURSOR_KEY).await.unwrap().is_none());
        store.set(SCAN_CURSOR_KEY, "1000").await.unwrap();
        store.set(SCAN_CURSOR_KEY, "1010").await.unwrap();
        assert_eq!(store.get(SCAN_CURSOR_KEY).await.unwrap().as_deref(), Some("1010"));
    }
}
