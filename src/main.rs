//! followsync - Follower synchronization and membership cache
//!
//! Main entry point for the followsync CLI.

use clap::{Parser, Subcommand};
use followsync::cache::{never_synced, MembershipStore, SqliteMembershipStore};
use followsync::config::{validate_config_result, FollowSyncConfig};
use followsync::ids::TargetId;
use followsync::integrations::HttpPageFetcher;
use followsync::query::MembershipQuery;
use followsync::scheduler::{shutdown_signal, Scheduler};
use followsync::sync::{SyncOrchestrator, SyncStrategy};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// followsync - Keep a local cache of who follows whom
#[derive(Parser, Debug)]
#[command(name = "followsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/followsync/config.yaml)
    #[arg(short, long, env = "FOLLOWSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync every configured target now and then on a fixed interval
    Daemon,

    /// Run one sweep for a target
    Sync {
        /// Target id (e.g. a Farcaster fid)
        target: String,

        /// Clear the cached set before repopulating it
        #[arg(long)]
        destructive: bool,
    },

    /// Check whether a user follows a target, using the cache only
    Check {
        /// Target id
        target: String,

        /// Follower id
        follower: String,
    },

    /// Show cached follower count and last sync time for a target
    Status {
        /// Target id
        target: String,
    },

    /// Remove a target's cached follower set
    Clear {
        /// Target id
        target: String,
    },

    /// Print the metrics last exported by the daemon (Prometheus text format)
    Metrics,
}

#[tokio::main]
async fn main() {
    if let Err(e) = followsync::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> followsync::Result<()> {
    let config = FollowSyncConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Daemon => handle_daemon(config).await,
        Commands::Sync {
            target,
            destructive,
        } => {
            let strategy = if destructive {
                SyncStrategy::Destructive
            } else {
                SyncStrategy::Incremental
            };
            handle_sync(config, TargetId::new(target), strategy).await
        }
        Commands::Check { target, follower } => {
            handle_check(config, TargetId::new(target), &follower).await
        }
        Commands::Status { target } => handle_status(config, TargetId::new(target)).await,
        Commands::Clear { target } => handle_clear(config, TargetId::new(target)).await,
        Commands::Metrics => handle_metrics(config),
    }
}

fn open_store(config: &FollowSyncConfig) -> followsync::Result<Arc<SqliteMembershipStore>> {
    Ok(Arc::new(SqliteMembershipStore::open(config.store_config())?))
}

fn build_orchestrator(config: &FollowSyncConfig) -> followsync::Result<Arc<SyncOrchestrator>> {
    let store = open_store(config)?;
    let fetcher = Arc::new(HttpPageFetcher::new(config.upstream_config())?);
    Ok(Arc::new(SyncOrchestrator::new(
        fetcher,
        store,
        config.sync_options(),
    )))
}

async fn handle_daemon(config: FollowSyncConfig) -> followsync::Result<()> {
    validate_config_result(&config)?;

    let orchestrator = build_orchestrator(&config)?;
    let handle = Scheduler::new(config.scheduler_config(), orchestrator).spawn();

    shutdown_signal().await?;
    handle.stop().await
}

async fn handle_sync(
    config: FollowSyncConfig,
    target: TargetId,
    strategy: SyncStrategy,
) -> followsync::Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let stats = orchestrator.sweep(&target, strategy).await?;

    println!("Synced followers of {} ({})", stats.target, stats.strategy);
    println!("  Pages:          {}", stats.pages);
    println!("  Fetched:        {}", stats.fetched);
    println!("  Newly added:    {}", stats.newly_added);
    println!("  Cached before:  {}", stats.previous_count);
    println!("  Cached now:     {}", stats.final_count);
    println!("  Elapsed:        {:.1}s", stats.elapsed.as_secs_f64());
    Ok(())
}

async fn handle_check(
    config: FollowSyncConfig,
    target: TargetId,
    follower: &str,
) -> followsync::Result<()> {
    let query = MembershipQuery::new(open_store(&config)?);
    let follows = query.check_follow(&target, follower).await?;

    if follows {
        println!("{} follows {}", follower.trim(), target);
    } else {
        println!("{} does not follow {} (per cache)", follower.trim(), target);
    }
    Ok(())
}

async fn handle_status(config: FollowSyncConfig, target: TargetId) -> followsync::Result<()> {
    let store = open_store(&config)?;
    let count = store.count(&target).await?;
    let last_sync = store.get_last_sync_time(&target).await?;

    println!("Target:     {}", target);
    println!("Followers:  {}", count);
    if last_sync == never_synced() {
        println!("Last sync:  never");
    } else {
        println!("Last sync:  {}", last_sync.to_rfc3339());
    }
    Ok(())
}

async fn handle_clear(config: FollowSyncConfig, target: TargetId) -> followsync::Result<()> {
    let store = open_store(&config)?;
    store.clear(&target).await?;
    println!("Cleared cached followers of {}", target);
    Ok(())
}

fn handle_metrics(config: FollowSyncConfig) -> followsync::Result<()> {
    let path = config.scheduler.metrics_file.ok_or_else(|| {
        followsync::FollowSyncError::Config(
            "Metrics export is disabled (scheduler.metrics_file is null)".to_string(),
        )
    })?;
    print!("{}", followsync::metrics::read_metrics_file(&path)?);
    Ok(())
}
