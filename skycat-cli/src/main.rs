//! skycat CLI - operator tooling for the catalog caches.
//!
//! Verifies and protects the on-disk snapshots and runs one-shot
//! enrichment sessions against a remote lookup endpoint.

use clap::{Parser, Subcommand};
use skycat::config::StoreConfig;
use skycat::store::DatasetMode;
use std::path::PathBuf;

mod commands;
mod error;

#[derive(Parser)]
#[command(name = "skycat")]
#[command(about = "Astronomical catalog cache tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory holding the cache snapshots (default: platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Operate on the magnitude-limited dataset instead of distance-limited
    #[arg(long, global = true)]
    magnitude: bool,

    /// Log orchestration detail to stderr (also honors RUST_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the integrity of every cache snapshot
    Verify,
    /// Write protective backups of every cache snapshot
    Protect,
    /// Show record counts and epochs for every cache snapshot
    Stats,
    /// Clear the enriched snapshot (a backup is written first)
    Clear,
    /// Enrich identifiers through the remote lookup service
    Enrich(commands::enrich::EnrichArgs),
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    let mut store_config = StoreConfig::new();
    if let Some(dir) = &cli.data_dir {
        store_config = store_config.with_data_dir(dir);
    }
    if cli.magnitude {
        store_config = store_config.with_dataset_mode(DatasetMode::Magnitude);
    }

    let result = match cli.command {
        Command::Verify => commands::verify::run(&store_config),
        Command::Protect => commands::protect::run(&store_config),
        Command::Stats => commands::stats::run(&store_config),
        Command::Clear => commands::clear::run(&store_config),
        Command::Enrich(args) => commands::enrich::run(store_config, args),
    };

    if let Err(e) = result {
        e.exit();
    }
}
