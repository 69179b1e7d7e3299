//! ChainMigrate CLI — operator tooling for the migration relayer.
//!
//! # Commands
//! ```text
//! chainmigrate status
//! chainmigrate list          [--status <s>] [--destination <addr>] [--contract <addr>]
//! chainmigrate clear-breaker
//! chainmigrate set-cursor    <block>
//! chainmigrate convert       --amount <N> --source-decimals <S> --destination-decimals <D>
//! chainmigrate scan          --rpc-url <url> --contract <addr> --from <F> [--to <T>]
//! chainmigrate info
//! ```

use std::collections::BTreeMap;

use alloy_primitives::U256;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use chainmigrate_core::kv::{HALT_FLAG_KEY, SCAN_CURSOR_KEY};
use chainmigrate_core::{
    AmountConverter, CircuitBreaker, MigrationRecord, MigrationStatus, MigratorConfig,
};
use chainmigrate_storage::StorageHandles;

mod cmd_scan;
mod telemetry;

#[derive(Parser)]
#[command(
    name = "chainmigrate",
    about = "ChainMigrate CLI: operator tool for the migration relayer",
    long_about = "
ChainMigrate CLI: inspect and operate the state of a migration relayer.
Reads the same database the relayer writes to (SQLite or Postgres).

ENVIRONMENT VARIABLES:
  DATABASE_URL   sqlite:<path>, postgres://... or memory
  RUST_LOG       log filter, e.g. info,chainmigrate_evm=debug
",
    version
)]
struct Cli {
    /// Relayer database
    #[arg(long, global = true, env = "DATABASE_URL", default_value = "sqlite:chainmigrate.db?mode=rwc")]
    database_url: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the halt flag, scan cursor and record counts by status
    Status {
        #[arg(long)]
        json: bool,
    },

    /// List persisted migrations
    List {
        /// Only records in this status: found, sent or errored
        #[arg(long)]
        status: Option<MigrationStatus>,
        /// Only records credited to this address
        #[arg(long)]
        destination: Option<String>,
        /// Only records emitted by this migration contract
        #[arg(long)]
        contract: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Clear the halt flag after the underlying problem has been fixed
    ClearBreaker,

    /// Overwrite the persisted scan cursor
    SetCursor {
        block: u64,
    },

    /// Convert a raw source amount to destination precision
    Convert {
        /// Amount in source base units
        #[arg(long)]
        amount: String,
        #[arg(long)]
        source_decimals: u8,
        #[arg(long)]
        destination_decimals: u8,
    },

    /// Dry-run scan: decode migration events in a block range without persisting
    Scan {
        #[arg(long, env = "CHAINMIGRATE_RPC_URL")]
        rpc_url: String,
        #[arg(long)]
        contract: String,
        #[arg(long)]
        from: u64,
        /// Last block to scan (default: chain head)
        #[arg(long)]
        to: Option<u64>,
        #[arg(long, default_value_t = chainmigrate_evm::DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
    },

    /// Show build info and configuration defaults
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json_logs);

    match cli.command {
        Commands::Status { json } => cmd_status(&cli.database_url, json).await,

        Commands::List { status, destination, contract, json } => {
            cmd_list(&cli.database_url, status, destination.as_deref(), contract.as_deref(), json)
                .await
        }

        Commands::ClearBreaker => cmd_clear_breaker(&cli.database_url).await,

        Commands::SetCursor { block } => cmd_set_cursor(&cli.database_url, block).await,

        Commands::Convert { amount, source_decimals, destination_decimals } => {
            cmd_convert(&amount, source_decimals, destination_decimals)
        }

        Commands::Scan { rpc_url, contract, from, to, chunk_size } => {
            cmd_scan::run(&rpc_url, &contract, from, to, chunk_size).await
        }

        Commands::Info => cmd_info(),
    }
}

async fn open_storage(url: &str) -> Result<StorageHandles> {
    chainmigrate_storage::open(url)
        .await
        .with_context(|| format!("failed to open database '{url}'"))
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_status(database_url: &str, as_json: bool) -> Result<()> {
    let storage = open_storage(database_url).await?;

    let halted = CircuitBreaker::new(storage.kv.clone())
        .is_tripped()
        .await
        .context("failed to read halt flag")?;
    let cursor = storage
        .kv
        .get(SCAN_CURSOR_KEY)
        .await
        .context("failed to read scan cursor")?;
    let records = storage
        .migrations
        .select_all()
        .await
        .context("failed to load migrations")?;

    let mut counts: BTreeMap<&'static str, usize> =
        [MigrationStatus::Found, MigrationStatus::Sent, MigrationStatus::Errored]
            .iter()
            .map(|s| (s.as_str(), 0))
            .collect();
    for record in &records {
        *counts.entry(record.status.as_str()).or_default() += 1;
    }

    if as_json {
        let report = serde_json::json!({
            "halted": halted,
            "cursor": cursor,
            "total": records.len(),
            "counts": counts,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Halted:  {}", if halted { "yes (run `chainmigrate clear-breaker`)" } else { "no" });
    println!("Cursor:  {}", cursor.as_deref().unwrap_or("<none>"));
    println!("Records: {}", records.len());
    for (status, count) in &counts {
        println!("  {status:<8} {count}");
    }
    Ok(())
}

async fn cmd_list(
    database_url: &str,
    status: Option<MigrationStatus>,
    destination: Option<&str>,
    contract: Option<&str>,
    as_json: bool,
) -> Result<()> {
    let storage = open_storage(database_url).await?;
    let store = &storage.migrations;

    let mut records = match (destination, contract) {
        (Some(dest), _) => store.select_by_destination(dest).await?,
        (None, Some(c)) => store.select_by_source_contract(c).await?,
        (None, None) => store.select_all().await?,
    };
    if let (Some(_), Some(c)) = (destination, contract) {
        records.retain(|r| r.source_contract.eq_ignore_ascii_case(c));
    }
    if let Some(status) = status {
        records.retain(|r| r.status == status);
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("no migrations match");
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    println!("{} migration(s)", records.len());
    Ok(())
}

fn print_record(record: &MigrationRecord) {
    println!("{}  [{}]", record.tx_hash, record.status);
    println!("  contract:    {}", record.source_contract);
    println!("  caller:      {}", record.caller);
    println!("  destination: {}", record.destination);
    println!("  raw amount:  {}", record.raw_amount);
    println!("  discovered:  {}", record.discovered_at.to_rfc3339());
    if let (Some(at), Some(amount)) = (&record.confirmed_at, &record.confirmed_amount) {
        println!("  confirmed:   {amount} at {}", at.to_rfc3339());
    }
}

async fn cmd_clear_breaker(database_url: &str) -> Result<()> {
    let storage = open_storage(database_url).await?;
    let breaker = CircuitBreaker::new(storage.kv.clone());

    if !breaker.is_tripped().await? {
        println!("{HALT_FLAG_KEY} is not set; nothing to clear");
        return Ok(());
    }
    breaker.clear().await.context("failed to clear halt flag")?;
    tracing::warn!("halt flag cleared by operator");
    println!("Halt flag cleared; the relayer resumes on its next tick");
    Ok(())
}

async fn cmd_set_cursor(database_url: &str, block: u64) -> Result<()> {
    let storage = open_storage(database_url).await?;
    let previous = storage.kv.get(SCAN_CURSOR_KEY).await?;
    storage
        .kv
        .set(SCAN_CURSOR_KEY, &block.to_string())
        .await
        .context("failed to write scan cursor")?;
    tracing::warn!(previous = ?previous, block, "scan cursor overridden by operator");
    println!(
        "{SCAN_CURSOR_KEY}: {} -> {block}",
        previous.as_deref().unwrap_or("<none>")
    );
    Ok(())
}

fn cmd_convert(amount: &str, source_decimals: u8, destination_decimals: u8) -> Result<()> {
    let raw: U256 = amount
        .parse()
        .map_err(|e| anyhow!("invalid amount '{amount}': {e}"))?;
    let converter = AmountConverter::new(destination_decimals, source_decimals)?;
    let converted = converter.convert(raw);

    println!("{converted}");
    if converted.is_zero() && !raw.is_zero() {
        eprintln!("note: amount is dust at {destination_decimals} decimals");
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    let defaults = MigratorConfig::default();
    let topic0 = chainmigrate_evm::event_topic0(&defaults.event.signature);

    println!("ChainMigrate v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Event:          {}", defaults.event.signature);
    println!("Topic0:         {topic0}");
    println!("Chunk size:     {} blocks", defaults.chunk_size);
    println!("Safety cushion: {} blocks", defaults.safety_cushion);
    println!("Finalization:   {} rounds", defaults.finalize.max_rounds);
    println!("Poll interval:  {}s", defaults.poll_interval_secs);
    println!();
    println!("KV keys:        {SCAN_CURSOR_KEY}, {HALT_FLAG_KEY}");
    println!("Storage:        memory, sqlite:<path>, postgres://...");
    Ok(())
}
