//! Hand-written fakes shared by the unit tests in this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::chain::{ChainRpc, LogFilter, RawLog};
use crate::conversion::DestinationAmount;
use crate::error::MigratorError;
use crate::kv::KeyValueStore;
use crate::notify::{Notifier, NotifyLevel};
use crate::store::{InsertOutcome, MigrationStore};
use crate::types::{MigrationRecord, MigrationStatus, StatusUpdate};
use crate::venue::{SettlementVenue, TransferReceipt};

// ─── KV ───────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeKv {
    pub data: Mutex<HashMap<String, String>>,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

#[async_trait]
impl KeyValueStore for FakeKv {
    async fn get(&self, key: &str) -> Result<Option<String>, MigratorError> {
        if self.fail_reads {
            return Err(MigratorError::KeyValue("connection reset".into()));
        }
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), MigratorError> {
        if self.fail_writes {
            return Err(MigratorError::KeyValue("read-only replica".into()));
        }
        self.data.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ─── Chain ────────────────────────────────────────────────────────────────────

pub struct FakeChain {
    head: Option<u64>,
}

impl FakeChain {
    pub fn with_head(head: u64) -> Self {
        Self { head: Some(head) }
    }

    pub fn failing() -> Self {
        Self { head: None }
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    async fn current_height(&self) -> Result<u64, MigratorError> {
        self.head.ok_or_else(|| MigratorError::Rpc("provider unavailable".into()))
    }

    async fn event_logs(
        &self,
        _contract: &str,
        _from: u64,
        _to: u64,
        _filter: &LogFilter,
    ) -> Result<Vec<RawLog>, MigratorError> {
        Ok(vec![])
    }

    async fn call(&self, _to: &str, _calldata: &[u8]) -> Result<Vec<u8>, MigratorError> {
        Err(MigratorError::Rpc("not scripted".into()))
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// Vec-backed store that can be told to fail writes for specific hashes.
#[derive(Default)]
pub struct FakeStore {
    pub records: Mutex<Vec<MigrationRecord>>,
    /// tx hash → number of `update_status` calls that should still fail.
    pub failing_updates: Mutex<HashMap<String, usize>>,
    pub update_calls: Mutex<Vec<(String, MigrationStatus)>>,
    /// tx hash → writes that commit but then report an error anyway.
    pub lost_acks: Mutex<HashMap<String, usize>>,
}

impl FakeStore {
    pub fn fail_updates_for(&self, tx_hash: &str, times: usize) {
        self.failing_updates.lock().unwrap().insert(tx_hash.to_string(), times);
    }

    pub fn lose_acks_for(&self, tx_hash: &str, times: usize) {
        self.lost_acks.lock().unwrap().insert(tx_hash.to_string(), times);
    }

    pub fn status_of(&self, tx_hash: &str) -> Option<MigrationStatus> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.tx_hash == tx_hash)
            .map(|r| r.status)
    }
}

#[async_trait]
impl MigrationStore for FakeStore {
    async fn existing_hashes(&self, tx_hashes: &[String]) -> Result<Vec<String>, MigratorError> {
        let records = self.records.lock().unwrap();
        Ok(tx_hashes
            .iter()
            .filter(|h| records.iter().any(|r| &r.tx_hash == *h))
            .cloned()
            .collect())
    }

    async fn insert_if_absent(
        &self,
        records: Vec<MigrationRecord>,
    ) -> Result<InsertOutcome, MigratorError> {
        let mut stored = self.records.lock().unwrap();
        let mut outcome = InsertOutcome::default();
        for record in records {
            if stored.iter().any(|r| r.tx_hash == record.tx_hash) {
                outcome.existing.push(record.tx_hash);
            } else {
                stored.push(record.clone());
                outcome.inserted.push(record);
            }
        }
        Ok(outcome)
    }

    async fn update_status(&self, tx_hash: &str, update: StatusUpdate) -> Result<(), MigratorError> {
        self.update_calls
            .lock()
            .unwrap()
            .push((tx_hash.to_string(), update.status()));
        if let Some(remaining) = self.failing_updates.lock().unwrap().get_mut(tx_hash) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MigratorError::Storage("deadlock detected".into()));
            }
        }
        let mut stored = self.records.lock().unwrap();
        let record = stored
            .iter_mut()
            .find(|r| r.tx_hash == tx_hash)
            .ok_or_else(|| MigratorError::Storage(format!("no migration {tx_hash}")))?;
        update.apply_to(record)?;
        if let Some(remaining) = self.lost_acks.lock().unwrap().get_mut(tx_hash) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MigratorError::Storage("connection reset after commit".into()));
            }
        }
        Ok(())
    }

    async fn select_by_status_not_equal(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status != status)
            .cloned()
            .collect())
    }

    async fn select_all(&self) -> Result<Vec<MigrationRecord>, MigratorError> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn select_by_destination(
        &self,
        destination: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.destination.eq_ignore_ascii_case(destination))
            .cloned()
            .collect())
    }

    async fn select_by_source_contract(
        &self,
        contract: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.source_contract.eq_ignore_ascii_case(contract))
            .cloned()
            .collect())
    }
}

// ─── Venue ────────────────────────────────────────────────────────────────────

/// Venue that rejects transfers to scripted destinations and records every call.
#[derive(Default)]
pub struct FakeVenue {
    /// destination → rejection reason.
    pub rejections: HashMap<String, String>,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl FakeVenue {
    pub fn rejecting(destination: &str, reason: &str) -> Self {
        let mut rejections = HashMap::new();
        rejections.insert(destination.to_string(), reason.to_string());
        Self {
            rejections,
            sent: Mutex::new(vec![]),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettlementVenue for FakeVenue {
    async fn submit_transfer(
        &self,
        amount: &DestinationAmount,
        destination: &str,
    ) -> Result<TransferReceipt, MigratorError> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), amount.to_string()));
        Ok(match self.rejections.get(destination) {
            Some(reason) => TransferReceipt::Rejected {
                reason: reason.clone(),
            },
            None => TransferReceipt::Accepted,
        })
    }

    async fn token_decimals(&self) -> Result<u8, MigratorError> {
        Ok(6)
    }
}

// ─── Notifier ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(NotifyLevel, String)>>,
}

impl RecordingNotifier {
    pub fn count(&self, level: NotifyLevel) -> usize {
        self.events.lock().unwrap().iter().filter(|(l, _)| *l == level).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str, _context: serde_json::Value) {
        self.events.lock().unwrap().push((level, message.to_string()));
    }
}
