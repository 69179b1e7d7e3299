//! Key-value collaborator contract.
//!
//! The relayer keeps exactly two values here: the scan cursor and the halt flag.

use async_trait::async_trait;

use crate::error::MigratorError;

/// Last block height the scan cursor was advanced to (base-10 string).
pub const SCAN_CURSOR_KEY: &str = "lastScanBlockNumber";

/// Circuit-breaker flag; the literal `"true"` means halted.
pub const HALT_FLAG_KEY: &str = "stopRunning";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, MigratorError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), MigratorError>;
}
