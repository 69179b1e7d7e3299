//! Fluent builder for a ready-to-run [`Pipeline`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainmigrate_evm::{HttpChainRpc, HttpRpcConfig, PipelineBuilder};
//! # use chainmigrate_core::SettlementVenue;
//!
//! # async fn example(venue: Arc<dyn SettlementVenue>) -> Result<(), Box<dyn std::error::Error>> {
//! let chain = Arc::new(HttpChainRpc::new("https://arb1.example.org", HttpRpcConfig::default())?);
//! let pipeline = PipelineBuilder::new(chain, venue)
//!     .contract("0x3333333333333333333333333333333333333333")
//!     .start_block(250_000_000)
//!     .safety_cushion(10)
//!     .storage(chainmigrate_storage::open("sqlite:relayer.db").await?)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chainmigrate_core::breaker::CircuitBreaker;
use chainmigrate_core::chain::ChainRpc;
use chainmigrate_core::config::{FinalizeConfig, MigratorConfig};
use chainmigrate_core::conversion::AmountConverter;
use chainmigrate_core::dedup::PersistenceDedup;
use chainmigrate_core::error::MigratorError;
use chainmigrate_core::executor::TransferExecutor;
use chainmigrate_core::finalize::FinalizationRetrier;
use chainmigrate_core::kv::KeyValueStore;
use chainmigrate_core::notify::{Notifier, TracingNotifier};
use chainmigrate_core::store::MigrationStore;
use chainmigrate_core::venue::{FailureClassifier, SettlementVenue};
use chainmigrate_core::window::BlockWindowManager;
use chainmigrate_storage::StorageHandles;

use crate::event::MigrationEventDecoder;
use crate::pipeline::{Pipeline, PipelineState};
use crate::scanner::ChainScanner;
use crate::token::discover_source_decimals;

pub struct PipelineBuilder {
    config: MigratorConfig,
    chain: Arc<dyn ChainRpc>,
    venue: Arc<dyn SettlementVenue>,
    store: Option<Arc<dyn MigrationStore>>,
    kv: Option<Arc<dyn KeyValueStore>>,
    notifier: Arc<dyn Notifier>,
}

impl PipelineBuilder {
    pub fn new(chain: Arc<dyn ChainRpc>, venue: Arc<dyn SettlementVenue>) -> Self {
        Self {
            config: MigratorConfig::default(),
            chain,
            venue,
            store: None,
            kv: None,
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Replace the whole configuration (e.g. one loaded from a file).
    pub fn config(mut self, config: MigratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a migration contract to monitor.
    pub fn contract(mut self, address: impl Into<String>) -> Self {
        self.config.contracts.push(address.into());
        self
    }

    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = block;
        self
    }

    pub fn safety_cushion(mut self, blocks: u64) -> Self {
        self.config.safety_cushion = blocks;
        self
    }

    /// Blocks per `eth_getLogs` call.
    pub fn chunk_size(mut self, blocks: u64) -> Self {
        self.config.chunk_size = blocks;
        self
    }

    /// Skip on-chain discovery of the source token precision.
    pub fn source_decimals(mut self, decimals: u8) -> Self {
        self.config.source_decimals = Some(decimals);
        self
    }

    /// Skip asking the venue for the destination token precision.
    pub fn destination_decimals(mut self, decimals: u8) -> Self {
        self.config.destination_decimals = Some(decimals);
        self
    }

    pub fn finalize(mut self, finalize: FinalizeConfig) -> Self {
        self.config.finalize = finalize;
        self
    }

    pub fn storage(mut self, handles: StorageHandles) -> Self {
        self.store = Some(handles.migrations);
        self.kv = Some(handles.kv);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Validate the configuration, resolve token precisions and wire the pipeline.
    ///
    /// Storage is mandatory: the cursor, the halt flag and `Sent` records must
    /// survive a restart.
    pub async fn build(self) -> Result<Pipeline, MigratorError> {
        let config = self.config;
        config.validate()?;

        let (store, kv) = match (self.store, self.kv) {
            (Some(store), Some(kv)) => (store, kv),
            _ => return Err(MigratorError::Config("storage is required".into())),
        };

        let source_decimals = match config.source_decimals {
            Some(d) => d,
            None => discover_source_decimals(self.chain.as_ref(), &config.contracts).await?,
        };
        let destination_decimals = match config.destination_decimals {
            Some(d) => d,
            None => self.venue.token_decimals().await?,
        };
        let converter = AmountConverter::new(destination_decimals, source_decimals)?;

        let decoder = MigrationEventDecoder::new(&config.event)?;
        tracing::info!(
            contracts = config.contracts.len(),
            source_decimals,
            destination_decimals,
            topic0 = %decoder.topic0(),
            "pipeline configured"
        );

        Ok(Pipeline {
            window: BlockWindowManager::new(
                kv.clone(),
                self.chain.clone(),
                config.start_block,
                config.safety_cushion,
            ),
            scanner: ChainScanner::new(self.chain, decoder, config.chunk_size),
            dedup: PersistenceDedup::new(store.clone()),
            executor: TransferExecutor::new(
                self.venue,
                store.clone(),
                self.notifier.clone(),
                FailureClassifier::new(&config.classifier),
            ),
            finalizer: FinalizationRetrier::new(store.clone(), config.finalize),
            breaker: CircuitBreaker::new(kv),
            store,
            converter,
            notifier: self.notifier,
            contracts: config.contracts,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            state: PipelineState::Idle,
        })
    }
}
