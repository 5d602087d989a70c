//! Tipcast CLI: runs the daily allocation, tip sync and validation jobs.
//!
//! # Commands
//! ```text
//! tipcast allocate    [--date YYYY-MM-DD] [--dry-run]
//! tipcast preview
//! tipcast sync
//! tipcast validate
//! tipcast balance     [--date YYYY-MM-DD] [--fid N]
//! tipcast leaderboard [--limit N]
//! tipcast reset-checkpoint --fid N
//! tipcast info
//! ```
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use tipcast_core::{
    leaderboard, summarize, AllocationCache, AllocationStore, CheckpointStore, SyncEngine, TipStore,
};
use tracing::info;

mod config;
mod logging;

use config::Config;

#[derive(Parser)]
#[command(
    name = "tipcast",
    about = "Daily token allocation and cast-tip accounting",
    long_about = "
Tipcast splits a daily token allowance across eligible holders by social rank,
harvests tips from casts, and validates them against each sender's allowance.

ENVIRONMENT VARIABLES:
  ALCHEMY_API_KEY            token A (NFT) holders
  MORALIS_API_KEY            token B (ERC-20) holders
  AIRSTACK_API_KEY           social-capital ranking
  NEYNAR_API_KEY             cast search and profiles
  TIPCAST_TOKEN_A_CONTRACT   token A contract on Base
  TIPCAST_TOKEN_B_CONTRACT   token B contract on Base
  TIPCAST_DB                 SQLite database (default ./tipcast.db)
  RUST_LOG                   log filter (default info)
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and save the allocation for a date
    Allocate {
        /// Allocation date (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Compute and print without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Show today's allocation without saving it (computed once per run)
    Preview,

    /// Sync tips for every known identity, then validate
    Sync,

    /// Validate pending tips against allocations
    Validate,

    /// Allocation and tipping balances for a date
    Balance {
        /// Date (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Restrict to one identity
        #[arg(long)]
        fid: Option<u64>,
    },

    /// Recipients ranked by valid tips received
    Leaderboard {
        /// Number of entries to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Forget an identity's sync checkpoint so its history is rescanned
    ResetCheckpoint {
        /// Identity whose checkpoint is dropped
        #[arg(long)]
        fid: u64,
    },

    /// Show effective configuration (secrets redacted)
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    let config = cli.config;
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::Allocate { date, dry_run } => cmd_allocate(&config, date.unwrap_or(today), today, dry_run).await,
        Commands::Preview => cmd_preview(&config, today).await,
        Commands::Sync => cmd_sync(&config).await,
        Commands::Validate => cmd_validate(&config).await,
        Commands::Balance { date, fid } => cmd_balance(&config, date.unwrap_or(today), today, fid).await,
        Commands::Leaderboard { limit } => cmd_leaderboard(&config, limit).await,
        Commands::ResetCheckpoint { fid } => cmd_reset_checkpoint(&config, fid).await,
        Commands::Info => print_json(&config.redacted()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_allocate(config: &Config, date: NaiveDate, today: NaiveDate, dry_run: bool) -> Result<()> {
    let allocator = config.allocator()?;

    let result = if dry_run {
        allocator
            .compute(date, today)
            .await
            .with_context(|| format!("computing allocations for {date}"))?
    } else {
        let store = config.open_store().await?;
        allocator
            .allocate_for_date(store.as_ref(), date, today)
            .await
            .with_context(|| format!("allocating for {date}"))?
    };

    info!(
        %date,
        dry_run,
        recipients = result.allocations.len(),
        total = result.total_allocated(),
        "Allocation ready"
    );

    print_json(&result)
}

/// Previews go through `AllocationCache`, which only pays off for a process
/// that serves repeated previews. A CLI run computes at most once.
async fn cmd_preview(config: &Config, today: NaiveDate) -> Result<()> {
    let allocator = config.allocator()?;
    let cache = AllocationCache::new();
    let result = allocator
        .preview(&cache, today)
        .await
        .context("computing today's allocation")?;
    print_json(&result)
}

async fn cmd_sync(config: &Config) -> Result<()> {
    let store = config.open_store().await?;
    let neynar = config.neynar()?;
    let engine = SyncEngine::new(store, neynar.clone(), neynar, config.sync());

    let report = engine.sync_all_tips().await.context("syncing tips")?;
    info!(identities = report.identities, "Sync and validation finished");
    print_json(&report)
}

async fn cmd_validate(config: &Config) -> Result<()> {
    let store = config.open_store().await?;
    let report = tipcast_core::validate_tips(store.as_ref())
        .await
        .context("validating tips")?;
    print_json(&report)
}

async fn cmd_balance(config: &Config, date: NaiveDate, today: NaiveDate, fid: Option<u64>) -> Result<()> {
    if date > today {
        bail!("date {date} is after today ({today})");
    }
    let store = config.open_store().await?;
    let allocations = store.allocations_for_date(date).await.context("loading allocations")?;
    let tips = store.tips_for_date(date).await.context("loading tips")?;
    print_json(&summarize(date, &allocations, &tips, fid))
}

async fn cmd_reset_checkpoint(config: &Config, fid: u64) -> Result<()> {
    let store = config.open_store().await?;
    store
        .delete(fid)
        .await
        .with_context(|| format!("deleting checkpoint for fid {fid}"))?;
    info!(fid, "Checkpoint reset");
    print_json(&serde_json::json!({ "fid": fid, "checkpoint": null }))
}

async fn cmd_leaderboard(config: &Config, limit: Option<usize>) -> Result<()> {
    let store = config.open_store().await?;
    let tips = store.valid_tips().await.context("loading tips")?;
    print_json(&leaderboard(&tips, limit))
}
