//! Shared types for the migration pipeline.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversion::DestinationAmount;
use crate::error::MigratorError;

// ─── MigrationStatus ──────────────────────────────────────────────────────────

/// Lifecycle of a persisted migration.
///
/// `Found → Sent`, `Found → Errored`, `Errored → Sent`. `Sent` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Observed on the source chain, not yet credited.
    Found,
    /// Credited on the settlement venue and confirmed in storage.
    Sent,
    /// The last transfer attempt failed; retried on the next tick.
    Errored,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::Sent => "sent",
            Self::Errored => "errored",
        }
    }

    /// Returns `true` if a record in `self` may move to `next`.
    pub fn can_transition_to(&self, next: MigrationStatus) -> bool {
        match (self, next) {
            (Self::Sent, _) => false,
            (_, Self::Found) => false,
            (Self::Found | Self::Errored, Self::Sent | Self::Errored) => true,
        }
    }
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MigrationStatus {
    type Err = MigratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "found" => Ok(Self::Found),
            "sent" => Ok(Self::Sent),
            "errored" => Ok(Self::Errored),
            other => Err(MigratorError::Storage(format!("unknown migration status '{other}'"))),
        }
    }
}

// ─── CandidateMigration ───────────────────────────────────────────────────────

/// A decoded `MigrationRegistered` log, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMigration {
    /// Source-chain transaction hash (`0x…`), the identity key.
    pub tx_hash: String,
    /// Migration contract that emitted the event.
    pub source_contract: String,
    /// Account that registered the migration.
    pub caller: String,
    /// Account to credit on the settlement venue.
    pub destination: String,
    /// Amount in source-chain base units.
    pub raw_amount: U256,
    pub block_number: u64,
    pub log_index: u32,
}

impl CandidateMigration {
    /// Turn the draft into a fresh `Found` record discovered at `now`.
    pub fn into_record(self, now: DateTime<Utc>) -> MigrationRecord {
        MigrationRecord {
            tx_hash: self.tx_hash,
            source_contract: self.source_contract,
            caller: self.caller,
            destination: self.destination,
            raw_amount: self.raw_amount,
            discovered_at: now,
            status: MigrationStatus::Found,
            confirmed_at: None,
            confirmed_amount: None,
        }
    }
}

// ─── MigrationRecord ──────────────────────────────────────────────────────────

/// A persisted migration, one per source transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub tx_hash: String,
    pub source_contract: String,
    pub caller: String,
    pub destination: String,
    pub raw_amount: U256,
    pub discovered_at: DateTime<Utc>,
    pub status: MigrationStatus,
    /// Set only when the record becomes `Sent`.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Destination-precision amount that was credited, set with `confirmed_at`.
    pub confirmed_amount: Option<String>,
}

// ─── PreparedTransfer ─────────────────────────────────────────────────────────

/// A record converted to destination precision and ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTransfer {
    /// Source transaction hash of the migration being credited.
    pub tx_hash: String,
    pub destination: String,
    pub amount: DestinationAmount,
}

// ─── StatusUpdate ─────────────────────────────────────────────────────────────

/// A status write against a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The transfer failed; retry on a later tick.
    Errored,
    /// The transfer succeeded; record when and how much was credited.
    Sent {
        confirmed_at: DateTime<Utc>,
        confirmed_amount: String,
    },
}

impl StatusUpdate {
    /// The status this update moves a record to.
    pub fn status(&self) -> MigrationStatus {
        match self {
            Self::Errored => MigrationStatus::Errored,
            Self::Sent { .. } => MigrationStatus::Sent,
        }
    }

    /// Apply the update to an in-memory record, enforcing the lifecycle.
    ///
    /// Confirming a record that is already `Sent` is a no-op, so a
    /// confirmation whose acknowledgement was lost can be written again.
    pub fn apply_to(&self, record: &mut MigrationRecord) -> Result<(), MigratorError> {
        if record.status == MigrationStatus::Sent && self.status() == MigrationStatus::Sent {
            return Ok(());
        }
        if !record.status.can_transition_to(self.status()) {
            return Err(MigratorError::Storage(format!(
                "migration {} cannot move from {} to {}",
                record.tx_hash,
                record.status,
                self.status()
            )));
        }
        record.status = self.status();
        if let Self::Sent {
            confirmed_at,
            confirmed_amount,
        } = self
        {
            record.confirmed_at = Some(*confirmed_at);
            record.confirmed_amount = Some(confirmed_amount.clone());
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
