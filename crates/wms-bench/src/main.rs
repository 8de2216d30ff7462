//! Warehouse scheduler bench
//!
//! Seeds an in-memory warehouse, then runs regular workers for a number of
//! timeslices alongside background planners and a reserver.

mod cli;
mod config;
mod fleet;

use anyhow::Result;
use cli::Cli;
use config::{load_config_file, BenchConfig};
use fleet::{Fleet, FleetParams};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wms_domain::seed::install;
use wms_scheduler::ShutdownHandle;
use wms_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("wms bench starting...");

    let config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => BenchConfig::default(),
    };

    let store = Store::new();
    install(&store, &config.seed)?;

    // Handle Ctrl+C for graceful shutdown
    let shutdown = Arc::new(ShutdownHandle::new());
    let trigger = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        trigger.trigger();
    });

    let params = FleetParams {
        timeslices: cli.timeslices,
        regular_workers: cli.regular_workers,
        planner_workers: cli.planner_workers,
        sales_per_timeslice: cli.sales_per_timeslice,
        profile: cli.with_profile.then(|| cli.profile_file.clone()),
    };
    let fleet = Fleet::new(store.clone(), config, params);
    let report = fleet.run(shutdown.subscribe()).await?;

    let stats = store.stats();
    tracing::info!(
        rounds = report.rounds,
        executed = report.executed,
        conflicts = report.conflicts,
        failed = report.failed,
        cancelled = report.cancelled,
        elapsed_ms = report.elapsed.as_millis() as u64,
        commits = stats.commits,
        rollbacks = stats.rollbacks,
        "wms bench finished"
    );
    for path in &report.profiles {
        tracing::info!("Profile written to {:?}", path);
    }

    if report.failed > 0 {
        anyhow::bail!("{} worker(s) failed", report.failed);
    }
    Ok(())
}
