//! One reconciliation tick, composed from the core components.
//!
//! ```text
//! Idle → Scanning → Persisting → Converting → Transferring → Finalizing → Idle
//!   └──────────────────────── Halted (breaker set, or fatal finalization)
//! ```
//!
//! A failing step returns the pipeline to `Idle`. Whatever that step already
//! made durable (the advanced cursor, per-item status writes) stays.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use chainmigrate_core::breaker::CircuitBreaker;
use chainmigrate_core::conversion::AmountConverter;
use chainmigrate_core::dedup::PersistenceDedup;
use chainmigrate_core::error::MigratorError;
use chainmigrate_core::executor::TransferExecutor;
use chainmigrate_core::finalize::FinalizationRetrier;
use chainmigrate_core::notify::{Notifier, NotifyLevel};
use chainmigrate_core::store::MigrationStore;
use chainmigrate_core::types::{MigrationStatus, PreparedTransfer};
use chainmigrate_core::window::BlockWindowManager;

use crate::scanner::ChainScanner;

/// Where the pipeline currently is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Scanning,
    Persisting,
    Converting,
    Transferring,
    Finalizing,
    /// The halt flag is set; nothing runs until an operator clears it.
    Halted,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Persisting => write!(f, "persisting"),
            Self::Converting => write!(f, "converting"),
            Self::Transferring => write!(f, "transferring"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

/// Counters for one completed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub from_block: u64,
    pub to_block: u64,
    /// Candidates decoded across all monitored contracts.
    pub scanned: usize,
    pub inserted: usize,
    pub already_known: usize,
    pub sent: usize,
    pub failed: usize,
    pub finalized: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(TickReport),
    /// The halt flag was set at entry; no work was done.
    Halted,
}

pub struct Pipeline {
    pub(crate) window: BlockWindowManager,
    pub(crate) scanner: ChainScanner,
    pub(crate) dedup: PersistenceDedup,
    pub(crate) store: Arc<dyn MigrationStore>,
    pub(crate) converter: AmountConverter,
    pub(crate) executor: TransferExecutor,
    pub(crate) finalizer: FinalizationRetrier,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) contracts: Vec<String>,
    pub(crate) poll_interval: Duration,
    pub(crate) state: PipelineState,
}

impl Pipeline {
    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn converter(&self) -> &AmountConverter {
        &self.converter
    }

    /// Configured delay between scheduled ticks.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Check the halt flag, then run one tick.
    ///
    /// On the fatal path the flag is tripped and an error notification is
    /// emitted before the error is returned.
    pub async fn run_once(&mut self) -> Result<RunOutcome, MigratorError> {
        if !self.breaker.should_run().await {
            self.state = PipelineState::Halted;
            tracing::warn!("halt flag is set, skipping run");
            return Ok(RunOutcome::Halted);
        }

        match self.tick().await {
            Ok(report) => {
                if report.inserted > 0 || report.sent > 0 || report.failed > 0 {
                    self.notifier.notify(
                        NotifyLevel::Info,
                        "migration tick completed",
                        serde_json::to_value(&report).unwrap_or_default(),
                    );
                }
                Ok(RunOutcome::Completed(report))
            }
            Err(e) if e.is_fatal() => {
                if let Err(trip_err) = self.breaker.trip().await {
                    tracing::error!(error = %trip_err, "failed to set halt flag after fatal error");
                }
                let unresolved: Vec<&str> = match &e {
                    MigratorError::FinalizationExhausted { unresolved } => {
                        unresolved.iter().map(|t| t.tx_hash.as_str()).collect()
                    }
                    _ => vec![],
                };
                self.notifier.notify(
                    NotifyLevel::Error,
                    "relayer halted: transferred migrations could not be confirmed",
                    serde_json::json!({ "error": e.to_string(), "unresolved": unresolved }),
                );
                Err(e)
            }
            Err(e) => {
                tracing::error!(error = %e, "tick failed, will retry next run");
                Err(e)
            }
        }
    }

    /// Run one tick without consulting the halt flag.
    pub async fn tick(&mut self) -> Result<TickReport, MigratorError> {
        let result = self.run_steps().await;
        self.state = match &result {
            Err(e) if e.is_fatal() => PipelineState::Halted,
            _ => PipelineState::Idle,
        };
        result
    }

    async fn run_steps(&mut self) -> Result<TickReport, MigratorError> {
        self.state = PipelineState::Scanning;
        let from = self.window.from_block_for_scan().await?;
        let to = self.window.advance_cursor_to_head().await?;
        let mut report = TickReport {
            from_block: from,
            to_block: to,
            ..Default::default()
        };

        let mut candidates = Vec::new();
        if from < to {
            for contract in &self.contracts {
                candidates.extend(self.scanner.scan_migrations(contract, from, to).await?);
            }
        } else {
            tracing::debug!(from, to, "empty scan window, retrying pending transfers only");
        }
        report.scanned = candidates.len();

        self.state = PipelineState::Persisting;
        let reconciled = self.dedup.reconcile(candidates).await?;
        report.inserted = reconciled.inserted.len();
        report.already_known = reconciled.already_known.len();

        self.state = PipelineState::Converting;
        let pending = self.store.select_by_status_not_equal(MigrationStatus::Sent).await?;
        let transfers: Vec<PreparedTransfer> = pending
            .into_iter()
            .map(|record| PreparedTransfer {
                amount: self.converter.convert(record.raw_amount),
                tx_hash: record.tx_hash,
                destination: record.destination,
            })
            .collect();

        self.state = PipelineState::Transferring;
        let batch = self.executor.send_batch(transfers).await;
        report.sent = batch.successes.len();
        report.failed = batch.failures.len();

        self.state = PipelineState::Finalizing;
        report.finalized = self.finalizer.finalize(batch.successes).await?;

        tracing::info!(
            from,
            to,
            scanned = report.scanned,
            inserted = report.inserted,
            sent = report.sent,
            failed = report.failed,
            "tick complete"
        );
        Ok(report)
    }
}
