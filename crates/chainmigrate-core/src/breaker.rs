//! Persisted halt flag.
//!
//! Unlike an RPC circuit breaker there is no half-open state and no timer:
//! once tripped, the relayer stays stopped until an operator clears the flag
//! by hand. The flag lives in the key-value store so it survives restarts
//! and is shared by every instance.

use std::sync::Arc;

use crate::error::MigratorError;
use crate::kv::{KeyValueStore, HALT_FLAG_KEY};

const TRIPPED: &str = "true";

pub struct CircuitBreaker {
    kv: Arc<dyn KeyValueStore>,
}

impl CircuitBreaker {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Whether a run may start. An unreadable flag counts as tripped.
    pub async fn should_run(&self) -> bool {
        match self.is_tripped().await {
            Ok(tripped) => !tripped,
            Err(e) => {
                tracing::warn!(error = %e, "could not read halt flag, refusing to run");
                false
            }
        }
    }

    pub async fn is_tripped(&self) -> Result<bool, MigratorError> {
        Ok(self.kv.get(HALT_FLAG_KEY).await?.as_deref() == Some(TRIPPED))
    }

    /// Stop all future runs. Idempotent.
    pub async fn trip(&self) -> Result<(), MigratorError> {
        self.kv.set(HALT_FLAG_KEY, TRIPPED).await?;
        tracing::error!("halt flag set, relayer will not run until it is cleared");
        Ok(())
    }

    /// Operator action after manual reconciliation. The pipeline never calls this.
    pub async fn clear(&self) -> Result<(), MigratorError> {
        self.kv.set(HALT_FLAG_KEY, "false").await?;
        tracing::info!("halt flag cleared");
        Ok(())
    }
}
