//! chainmigrate-core — foundation for the exactly-once migration relayer.
//!
//! # Architecture
//!
//! ```text
//! Pipeline (chainmigrate-evm)
//!     ├── BlockWindowManager   (scan cursor + safety cushion)
//!     ├── ChainScanner         (chunked eth_getLogs + decode, chainmigrate-evm)
//!     ├── PersistenceDedup     (idempotent insert keyed by tx hash)
//!     ├── AmountConverter      (source → destination precision, truncating)
//!     ├── TransferExecutor     (sequential venue transfers, failure classes)
//!     ├── FinalizationRetrier  (bounded confirmation rounds)
//!     └── CircuitBreaker       (persisted halt flag)
//! ```
//!
//! Everything that talks to the outside world is a trait defined here:
//! [`MigrationStore`], [`KeyValueStore`], [`ChainRpc`], [`SettlementVenue`]
//! and [`Notifier`].

pub mod breaker;
pub mod chain;
pub mod config;
pub mod conversion;
pub mod dedup;
pub mod error;
pub mod executor;
pub mod finalize;
pub mod kv;
pub mod notify;
pub mod retry;
pub mod store;
pub mod types;
pub mod venue;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use breaker::CircuitBreaker;
pub use chain::{ChainRpc, LogFilter, RawLog};
pub use config::MigratorConfig;
pub use conversion::{AmountConverter, DestinationAmount};
pub use dedup::{PersistenceDedup, ReconcileOutcome};
pub use error::{MigratorError, TransferError};
pub use executor::{BatchOutcome, FailedTransfer, TransferExecutor};
pub use finalize::FinalizationRetrier;
pub use kv::KeyValueStore;
pub use notify::{NotifyLevel, Notifier, TracingNotifier};
pub use retry::{RetryConfig, RetryPolicy};
pub use store::{InsertOutcome, MigrationStore};
pub use types::{CandidateMigration, MigrationRecord, MigrationStatus, PreparedTransfer, StatusUpdate};
pub use venue::{FailureClassifier, SettlementVenue, TransferReceipt};
pub use window::BlockWindowManager;
