//! PostgreSQL storage backend for ChainMigrate.
//!
//! Requires the `postgres` feature:
//! ```toml
//! chainmigrate-storage = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! # Schema
//! Created on first connect:
//! - `chainmigrate_migrations`: one row per source tx hash
//! - `chainmigrate_kv`: scan cursor and halt flag

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use chainmigrate_core::error::MigratorError;
use chainmigrate_core::kv::KeyValueStore;
use chainmigrate_core::store::{InsertOutcome, MigrationStore};
use chainmigrate_core::types::{MigrationRecord, MigrationStatus, StatusUpdate};

use crate::parse_amount;

const SELECT_COLUMNS: &str = "SELECT tx_hash, source_contract, caller, destination, raw_amount,
        discovered_at, status, confirmed_at, confirmed_amount FROM chainmigrate_migrations";

fn storage_err(e: sqlx::Error) -> MigratorError {
    MigratorError::Storage(e.to_string())
}

// ─── Connection options ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

// ─── PostgresStorage ─────────────────────────────────────────────────────────

/// Cheaply cloneable; wraps a connection pool.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect with default pool options and initialise the schema.
    pub async fn connect(database_url: &str) -> Result<Self, MigratorError> {
        Self::connect_with_options(database_url, PostgresOptions::default()).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        opts: PostgresOptions,
    ) -> Result<Self, MigratorError> {
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(opts.connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| MigratorError::Storage(format!("postgres connect: {e}")))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        info!("PostgresStorage connected and schema initialized");
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), MigratorError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chainmigrate_migrations (
                seq              BIGSERIAL,
                tx_hash          TEXT        PRIMARY KEY,
                source_contract  TEXT        NOT NULL,
                caller           TEXT        NOT NULL,
                destination      TEXT        NOT NULL,
                raw_amount       TEXT        NOT NULL,
                discovered_at    TIMESTAMPTZ NOT NULL,
                status           TEXT        NOT NULL,
                confirmed_at     TIMESTAMPTZ,
                confirmed_amount TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chainmigrate_migrations_status
             ON chainmigrate_migrations(status, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chainmigrate_migrations_destination
             ON chainmigrate_migrations(lower(destination))",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chainmigrate_kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!("PostgresStorage schema initialized");
        Ok(())
    }

    async fn select_where(
        &self,
        clause: &str,
        arg: Option<&str>,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        let sql = format!("{SELECT_COLUMNS} {clause} ORDER BY seq");
        let mut query = sqlx::query(&sql);
        if let Some(arg) = arg {
            query = query.bind(arg);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(storage_err)?;
        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &PgRow) -> Result<MigrationRecord, MigratorError> {
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
impl MigrationStore for PostgresStorage {
    async fn existing_hashes(&self, tx_hashes: &[String]) -> Result<Vec<String>, MigratorError> {
        if tx_hashes.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query("SELECT tx_hash FROM chainmigrate_migrations WHERE tx_hash = ANY($1)")
            .bind(tx_hashes)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("tx_hash").map_err(storage_err))
            .collect()
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
                "INSERT INTO chainmigrate_migrations
                    (tx_hash, source_contract, caller, destination, raw_amount, discovered_at, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
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
                sqlx::query(
                    "UPDATE chainmigrate_migrations SET status = $1
                     WHERE tx_hash = $2 AND status <> 'sent'",
                )
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
                    "UPDATE chainmigrate_migrations
                     SET status = $1, confirmed_at = $2, confirmed_amount = $3
                     WHERE tx_hash = $4 AND status <> 'sent'",
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
            sqlx::query_scalar("SELECT status FROM chainmigrate_migrations WHERE tx_hash = $1")
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
        self.select_where("WHERE status <> $1", Some(status.as_str())).await
    }

    async fn select_all(&self) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.select_where("", None).await
    }

    async fn select_by_destination(
        &self,
        destination: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.select_where("WHERE lower(destination) = lower($1)", Some(destination))
            .await
    }

    async fn select_by_source_contract(
        &self,
        contract: &str,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        self.select_where("WHERE lower(source_contract) = lower($1)", Some(contract))
            .await
    }
}

// ─── KeyValueStore impl ──────────────────────────────────────────────────────

#[async_trait]
impl KeyValueStore for PostgresStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, MigratorError> {
        let row = sqlx::query("SELECT value FROM chainmigrate_kv WHERE key = $1")
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
            "INSERT INTO chainmigrate_kv (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
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
