//! Block window manager: owns the persisted scan cursor.
//!
//! Every tick scans `[cursor − cushion, head]`. The cushion re-reads a few
//! blocks the provider may not have served consistently last time; the
//! duplicates it produces are absorbed by idempotent persistence.

use std::sync::Arc;

use crate::chain::ChainRpc;
use crate::error::MigratorError;
use crate::kv::{KeyValueStore, SCAN_CURSOR_KEY};

pub struct BlockWindowManager {
    kv: Arc<dyn KeyValueStore>,
    chain: Arc<dyn ChainRpc>,
    start_block: u64,
    safety_cushion: u64,
}

impl BlockWindowManager {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        chain: Arc<dyn ChainRpc>,
        start_block: u64,
        safety_cushion: u64,
    ) -> Self {
        Self {
            kv,
            chain,
            start_block,
            safety_cushion,
        }
    }

    /// The persisted cursor, if one has ever been written.
    pub async fn cursor(&self) -> Result<Option<u64>, MigratorError> {
        match self.kv.get(SCAN_CURSOR_KEY).await? {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
                MigratorError::KeyValue(format!("invalid {SCAN_CURSOR_KEY} value '{raw}': {e}"))
            }),
        }
    }

    /// First block of the next scan: the configured start height on a fresh
    /// deployment, otherwise the cursor minus the safety cushion.
    pub async fn from_block_for_scan(&self) -> Result<u64, MigratorError> {
        Ok(match self.cursor().await? {
            None => self.start_block,
            Some(cursor) => cursor.saturating_sub(self.safety_cushion),
        })
    }

    /// Read the chain head, persist it as the new cursor and return it.
    ///
    /// Runs before any scan work so that a failed tick re-scans a small range
    /// next time instead of skipping blocks.
    pub async fn advance_cursor_to_head(&self) -> Result<u64, MigratorError> {
        let head = self.chain.current_height().await?;
        self.kv.set(SCAN_CURSOR_KEY, &head.to_string()).await?;
        tracing::debug!(head, "scan cursor advanced");
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChain, FakeKv};

    fn manager(kv: Arc<FakeKv>, head: u64) -> BlockWindowManager {
        BlockWindowManager::new(kv, Arc::new(FakeChain::with_head(head)), 42, 5)
    }

    #[tokio::test]
    async fn fresh_deployment_starts_at_configured_block() {
        let kv = Arc::new(FakeKv::default());
        assert_eq!(manager(kv, 2000).from_block_for_scan().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn cushion_is_subtracted_from_cursor() {
        let kv = Arc::new(FakeKv::default());
        kv.set(SCAN_CURSOR_KEY, "1000").await.unwrap();
        assert_eq!(manager(kv, 2000).from_block_for_scan().await.unwrap(), 995);
    }

    #[tokio::test]
    async fn cushion_saturates_at_genesis() {
        let kv = Arc::new(FakeKv::default());
        kv.set(SCAN_CURSOR_KEY, "3").await.unwrap();
        assert_eq!(manager(kv, 2000).from_block_for_scan().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn advance_persists_head() {
        let kv = Arc::new(FakeKv::default());
        let mgr = manager(kv.clone(), 2000);
        assert_eq!(mgr.advance_cursor_to_head().await.unwrap(), 2000);
        assert_eq!(kv.get(SCAN_CURSOR_KEY).await.unwrap().as_deref(), Some("2000"));
        assert_eq!(mgr.from_block_for_scan().await.unwrap(), 1995);
    }

    #[tokio::test]
    async fn garbage_cursor_is_an_error() {
        let kv = Arc::new(FakeKv::default());
        kv.set(SCAN_CURSOR_KEY, "not-a-block").await.unwrap();
        let err = manager(kv, 2000).from_block_for_scan().await.unwrap_err();
        assert!(matches!(err, MigratorError::KeyValue(_)));
    }

    #[tokio::test]
    async fn head_lookup_failure_leaves_cursor_untouched() {
        let kv = Arc::new(FakeKv::default());
        kv.set(SCAN_CURSOR_KEY, "1000").await.unwrap();
        let mgr = BlockWindowManager::new(kv.clone(), Arc::new(FakeChain::failing()), 0, 5);
        assert!(mgr.advance_cursor_to_head().await.is_err());
        assert_eq!(kv.get(SCAN_CURSOR_KEY).await.unwrap().as_deref(), Some("1000"));
    }
}
