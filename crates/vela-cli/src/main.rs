//! Operational harness for the vela ingestion core.
//!
//! `vela validate` checks a cluster configuration; `vela run` drives
//! refresh/execute cycles against it, fanning work units out to parallel
//! workers.

mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use snafu::ResultExt;
use tracing::info;
use vela_ingest::{
    BlockManager, ClusterConfig, IngestExecutor, IngestSpec, SourceRegistry, SpecRepo,
};

use crate::error::{CliError, CliResult, ClockSnafu, ConfigSnafu};

#[derive(Debug, Parser)]
#[command(name = "vela", about = "vela ingestion harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate a cluster configuration, then print its tables
    Validate {
        #[arg(long)]
        config: PathBuf,
    },

    /// Run refresh/execute cycles until interrupted
    Run {
        #[arg(long)]
        config: PathBuf,

        /// Execute a single cycle and exit
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Parallel ingest workers
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
}

fn unix_now() -> CliResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| ClockSnafu.build())
}

fn load_config(path: &PathBuf) -> CliResult<ClusterConfig> {
    ClusterConfig::load(path).context(ConfigSnafu {
        path: path.display().to_string(),
    })
}

fn cmd_validate(path: PathBuf) -> CliResult<()> {
    let config = load_config(&path)?;
    println!(
        "configuration v{} ok: {} tables, {} rows/block, refresh {}s",
        config.version,
        config.tables.len(),
        config.settings.max_block_rows,
        config.settings.refresh_secs
    );
    for table in config.tables() {
        println!("  {}", table.summary());
    }
    Ok(())
}

async fn cmd_run(path: PathBuf, once: bool, workers: usize) -> CliResult<()> {
    // Configuration failures are fatal here, before any cycle starts.
    let config = load_config(&path)?;

    let blocks = Arc::new(BlockManager::new());
    let sources = Arc::new(SourceRegistry::new());
    let executor = Arc::new(IngestExecutor::new(
        Arc::clone(&blocks),
        Arc::clone(&sources),
        config.settings.clone(),
    ));
    let mut repo = SpecRepo::new();

    loop {
        let now = unix_now()?;
        repo.refresh(&config, &sources, now).await;

        let claimed: Vec<IngestSpec> = repo
            .ready_ids()
            .iter()
            .filter_map(|id| repo.claim(id))
            .collect();

        let total = claimed.len();
        let finished: Vec<(IngestSpec, bool)> = stream::iter(claimed.into_iter().map(|mut spec| {
            let executor = Arc::clone(&executor);
            async move {
                let ok = executor.execute(&mut spec, now).await;
                (spec, ok)
            }
        }))
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

        let done = finished.iter().filter(|(_, ok)| *ok).count();
        for (spec, _) in finished {
            repo.finish(spec);
        }

        let mut expired = 0;
        let mut resident_rows = 0;
        let mut resident_bytes = 0;
        for table in config.tables() {
            expired += blocks.evict_expired(&table, now);
            resident_rows += blocks.rows(&table.name);
            resident_bytes += blocks.bytes(&table.name);
        }

        let metrics = blocks.metrics();
        info!(
            cycle_units = total,
            cycle_done = done,
            cycle_expired = expired,
            resident_rows,
            resident_bytes,
            admitted = metrics.admitted,
            rejected = metrics.rejected,
            evicted = metrics.evicted,
            "ingest cycle finished"
        );

        if once {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(config.settings.refresh_secs)).await;
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result: Result<(), CliError> = match cli.command {
        Command::Validate { config } => cmd_validate(config),
        Command::Run {
            config,
            once,
            workers,
        } => cmd_run(config, once, workers).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
