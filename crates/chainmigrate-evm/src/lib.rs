//! chainmigrate-evm — EVM-specific parts of the migration relayer.
//!
//! - [`event`]: `MigrationRegistered` topic0 and log decoding
//! - [`scanner`]: chunked `eth_getLogs` scan per migration contract
//! - [`token`]: source token precision discovery via `eth_call`
//! - [`http`]: `reqwest` JSON-RPC implementation of `ChainRpc`
//! - [`pipeline`] / [`runner`]: one tick, and ticks on a schedule
//! - [`builder`]: fluent construction of a [`Pipeline`]

pub mod builder;
pub mod event;
pub mod http;
pub mod pipeline;
pub mod runner;
pub mod scanner;
pub mod token;

pub use builder::PipelineBuilder;
pub use event::{event_topic0, MigrationEventDecoder};
pub use http::{HttpChainRpc, HttpRpcConfig};
pub use pipeline::{Pipeline, PipelineState, RunOutcome, TickReport};
pub use runner::Runner;
pub use scanner::{ChainScanner, DEFAULT_CHUNK_SIZE};
