use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use page_snapshot::{FileManager, HttpFetcher, Scheduler, SnapshotCommand, SnapshotEngine, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = SnapshotCommand::parse();
    let config = args.snapshot_config();

    if let Err(e) = FileManager::create(&config.output_dir) {
        eprintln!("{} {}", "path error:".red(), e);
        std::process::exit(1);
    }

    let fetcher = HttpFetcher::new(args.fetch_config()).context("Failed to build HTTP client")?;
    let engine = SnapshotEngine::new(fetcher, SystemClock, config);

    println!("{}", "work start".green());
    let cycles = Scheduler::new(engine, args.interval())
        .with_max_cycles(args.max_cycles)
        .run()
        .await;

    tracing::info!(cycles, "scheduler stopped");
    Ok(())
}

// Diagnostics go to stderr; stdout only carries the banner.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
