//! `chainmigrate scan`: decode migration events over a block range and print
//! them, without touching the database.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use chainmigrate_core::chain::ChainRpc;
use chainmigrate_core::config::EventLayout;
use chainmigrate_evm::{ChainScanner, HttpChainRpc, HttpRpcConfig, MigrationEventDecoder};

pub async fn run(
    rpc_url: &str,
    contract: &str,
    from: u64,
    to: Option<u64>,
    chunk_size: u64,
) -> Result<()> {
    if chunk_size == 0 {
        bail!("--chunk-size must be at least 1");
    }

    let chain = Arc::new(
        HttpChainRpc::new(rpc_url, HttpRpcConfig::default())
            .with_context(|| format!("failed to build RPC client for '{rpc_url}'"))?,
    );
    let to = match to {
        Some(to) => to,
        None => chain.current_height().await.context("failed to read chain head")?,
    };
    if from >= to {
        bail!("empty range: --from {from} must be below --to {to}");
    }

    let decoder = MigrationEventDecoder::new(&EventLayout::default())?;
    tracing::info!(contract, from, to, chunk_size, topic0 = %decoder.topic0(), "dry-run scan");

    let scanner = ChainScanner::new(chain, decoder, chunk_size);
    let candidates = scanner
        .scan_migrations(contract, from, to)
        .await
        .with_context(|| format!("scan of {contract} over [{from}, {to}] failed"))?;

    println!("{}", serde_json::to_string_pretty(&candidates)?);
    eprintln!("{} migration event(s) in [{from}, {to}]", candidates.len());
    Ok(())
}
