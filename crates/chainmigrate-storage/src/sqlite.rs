//! SQLite storage backend for ChainMigrate.
//!
//! Keeps migrations and the key-value entries in a single SQLite file.
//!
//! # Usage
//! ```rust,no_run
//! use chainmigrate_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStorage::open("./migrations.db").await?;
//! let scratch = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainmigrate_core::error::MigratorError;
use chainmigrate_core::kv::KeyValueStore;
use chainmigrate_core::store::{InsertOutcome, MigrationStore};
use chainmigrate_core::types::{MigrationRecord, MigrationStatus, StatusUpdate};

use crate::parse_amount;

/// Bound parameters per `IN (…)` query, under SQLite's variable limit.
const IN_CHUNK: usize = 500;

const SELECT_COLUMNS: &str = "SELECT tx_hash, source_contract, caller, destination, raw_amount,
        discovered_at, status, confirmed_at, confirmed_amount FROM migrations";

fn storage_err(e: sqlx::Error) -> MigratorError {
    MigratorError::Storage(e.to_string())
}

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// Accepts a plain file path or a full `sqlite:` URL.
    pub async fn open(path: &str) -> Result<Self, MigratorError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// A private in-memory database, gone when the storage is dropped.
    pub async fn in_memory() -> Result<Self, MigratorError> {
        // One connection: every pooled connection to `:memory:` would be a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), MigratorError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS migrations (
                tx_hash          TEXT PRIMARY KEY,
                source_contract  TEXT NOT NULL,
                caller           TEXT NOT NULL,
                destination      TEXT NOT NULL,
                raw_amount       TEXT NOT NULL,
                discovered_at    TEXT NOT NULL,
                status           TEXT NOT NULL,
                confirmed_at     TEXT,
                confirmed_amount TEXT
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_migrations_status ON migrations (status);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_migrations_destination ON migrations (lower(destination));",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn select_where(
        &self,
        clause: &str,
        arg: Option<&str>,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        let sql = format!("{SELECT_COLUMNS} {clause} ORDER BY rowid");
        let mut query = sqlx::query(&sql);
        if let Some(arg) = arg {
            query = query.bind(arg);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(storage_err)?;
        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &SqliteRow) -> Result<MigrationRecord, MigratorError> {
    let raw_amount: String = row.try_get("raw_amount").map_err(storage_err)?;
    let status: String = row.try_get("status").map_err(storage_err)?;
    Ok(MigrationRecord {
        tx_hash: row.try_get("tx_hash").map_err(storage_err)?,
        source_contract: row.try_get("source_contract").map_err(storage_err)?,
        caller: row.try_get("caller").map_err(storage_err)?,
        destination: row.try_get("destination").map_err(storage_err)?,
        raw_amount: parse_amount(&raw_amount)?,
        discovered_at: row.try_get::<DateTime<Utc>, _>("discovered_at").map_err(storage_err)?,
        status: status.parse()?,
        confirmed_at: row
            .try_get::<Option<DateTime<Utc>>, _>("confirmed_at")
            .map_err(storage_err)?,
        confirmed_amount: row.try_get("confirmed_amount").map_err(storage_err)?,
    })
}

// ─── MigrationStore impl ─────────────────────────────────────────────────────

#[async_trait]
impl MigrationStore for SqliteStorage {
    async fn existing_hashes(&self, tx_hashes: &[String]) -> Result<Vec<String>, MigratorError> {
        let mut found = Vec::new();
        for chunk in tx_hashes.chunks(IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT tx_hash FROM migrations WHERE tx_hash IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for hash in chunk {
                query = query.bind(hash);
            }
            let rows = query.fetch_all(&self.pool).await.map_err(storage_err)?;
            for row in rows {
                found.push(row.try_get::<String, _>("tx_hash").map_err(storage_err)?);
            }
        }
        Ok(found)
    }

    async fn insert_if_absent(
        &self,
        records: Vec<MigrationRecord>,
    ) -> Result<InsertOutcome, MigratorError> {
        let mut outcome = InsertOutcome::default();
        if records.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for record in records {
            let result = sqlx::query(
                "INSERT INTO migrations
                    (tx_hash, source_contract, caller, destination, raw_amount, discovered_at, status)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (tx_hash) DO NOTHING",
            )
            .bind(&record.tx_hash)
            .bind(&record.source_contract)
            .bind(&record.caller)
            .bind(&record.destination)
            .bind(record.raw_amount.to_string())
            .bind(record.discovered_at)
            .bind(record.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

            if result.rows_affected() == 1 {
                outcome.inserted.push(record);
            } else {
                outcome.existing.push(record.tx_hash);
            }
        }
        tx.commit()
            .await
            .map_err(|e| MigratorError::Storage(format!("commit batch: {e}")))?;

        debug!(inserted = outcome.inserted.len(), existing = outcome.existing.len(), "migrations stored");
        Ok(outcome)
    }

    async fn update_status(&self, tx_hash: &str, update: StatusUpdate) -> Result<(), MigratorError> {
        let result = match &update {
            StatusUpdate::Errored => {
                sqlx::query("UPDATE migrations SET status = ? WHERE tx_hash = ? AND status <> 'sent'")
                    .bind(MigrationStatus::Errored.as_str())
                    .bind(tx_hash)
                    .execute(&self.pool)
                    .await
            }
            StatusUpdate::Sent {
                confirmed_at,
                confirmed_amount,
            } => {
                sqlx::query(
                    "UPDATE migrations SET status = ?, confirmed_at = ?, confirmed_amount = ?
                     WHERE tx_hash = ? AND status <> 'sent'",
                )
                .bind(MigrationStatus::Sent.as_str())
                .bind(*confirmed_at)
                .bind(confirmed_amount)
                .bind(tx_hash)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(storage_err)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing matched: either no such record, or it is already `Sent`.
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM migrations WHERE tx_hash = ?")
                .bind(tx_hash)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_err)?;
        match current.as_deref() {
            None => Err(MigratorError::Storage(format!("no migration with tx hash {tx_hash}"))),
            Some("sent") if update.status() == MigrationStatus::Sent => Ok(()),
            Some(status) => Err(MigratorError::Storage(format!(
                "migration {tx_hash} cannot move from {status} to {}",
                update.status()
            ))),
        }
    }

    async fn select_by_status_not_equal(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.select_where("WHERE status <> ?", Some(status.as_str())).await
    }

    async fn select_all(&self) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.select_where("", None).await
    }

    async fn select_by_destination(
        &self,
        destination: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.select_where("WHERE lower(destination) = lower(?)", Some(destination))
            .await
    }

    async fn select_by_source_contract(
        &self,
        contract: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.select_where("WHERE lower(source_contract) = lower(?)", Some(contract))
            .await
    }
}

// ─── KeyValueStore impl ──────────────────────────────────────────────────────

#[async_trait]
impl KeyValueStore for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, MigratorError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MigratorError::KeyValue(e.to_string()))?;
        row.map(|r| r.try_get::<String, _>("value"))
            .transpose()
            .map_err(|e| MigratorError::KeyValue(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), MigratorError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value) VALUES (?, ?)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| MigratorError::KeyValue(e.to_string()))?;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
