//! Chunked `MigrationRegistered` scan over one migration contract.

use std::sync::Arc;

use chainmigrate_core::chain::ChainRpc;
use chainmigrate_core::error::MigratorError;
use chainmigrate_core::types::CandidateMigration;

use crate::event::MigrationEventDecoder;

/// Blocks per `eth_getLogs` call unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: u64 = 500;

pub struct ChainScanner {
    chain: Arc<dyn ChainRpc>,
    decoder: MigrationEventDecoder,
    chunk_size: u64,
}

impl ChainScanner {
    pub fn new(chain: Arc<dyn ChainRpc>, decoder: MigrationEventDecoder, chunk_size: u64) -> Self {
        Self {
            chain,
            decoder,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Decode every migration `contract` emitted in `[from, to]`.
    ///
    /// All-or-nothing: the first failing chunk aborts the call and anything
    /// decoded from earlier chunks is dropped.
    pub async fn scan_migrations(
        &self,
        contract: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<CandidateMigration>, MigratorError> {
        if from >= to {
            return Err(MigratorError::InvalidRange { from, to });
        }

        let filter = self.decoder.filter();
        let mut candidates = Vec::new();
        let mut current = from;
        while current <= to {
            let chunk_end = current.saturating_add(self.chunk_size - 1).min(to);

            let logs = self
                .chain
                .event_logs(contract, current, chunk_end, &filter)
                .await
                .map_err(|e| MigratorError::Scan {
                    from: current,
                    to: chunk_end,
                    reason: e.to_string(),
                })?;

            let mut decoded = 0usize;
            for log in &logs {
                if log.is_removed() {
                    continue;
                }
                let candidate = self.decoder.decode(log).map_err(|e| MigratorError::Scan {
                    from: current,
                    to: chunk_end,
                    reason: e.to_string(),
                })?;
                candidates.push(candidate);
                decoded += 1;
            }

            tracing::debug!(contract, from = current, to = chunk_end, decoded, "scanned chunk");

            if chunk_end == to {
                break;
            }
            current = chunk_end + 1;
        }

        tracing::info!(contract, from, to, found = candidates.len(), "scanned migrations");
        Ok(candidates)
    }
}
