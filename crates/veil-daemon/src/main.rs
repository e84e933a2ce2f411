//! veil-daemon - protection-core runtime binary.
//!
//! Loads configuration, builds the component graph, spawns the background
//! workers, and runs until SIGINT/SIGTERM. The capture pipeline and the
//! collaborator surfaces attach in-process through the library crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use veil_core::allowlist::FileAllowlistSource;
use veil_core::config::CoreConfig;
use veil_daemon::state::DaemonState;
use veil_daemon::workers;

/// veil daemon - zero-leakage protection core runtime
#[derive(Parser, Debug)]
#[command(name = "veil-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "veil.toml")]
    config: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = CoreConfig::from_file(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let (state, backfill_rx) = DaemonState::build(config).context("building daemon state")?;
    info!("protection core initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let allowlist_source = Arc::new(FileAllowlistSource::new(
        state.config.allowlist.feed_path.clone(),
    ));
    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(workers::allowlist_refresh::run(
        state.allowlist.clone(),
        allowlist_source,
        Arc::clone(&state.audit),
        state.config.allowlist.clone(),
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(workers::schedule_regen::run(
        Arc::clone(&state),
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(workers::expiry_sweep::run(
        Arc::clone(&state),
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(workers::backfill_worker::run(
        Arc::clone(&state.backfill),
        backfill_rx,
        Duration::from_secs(state.config.backfill.retry_backoff_secs),
        shutdown_rx,
    )));

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }

    shutdown_tx.send(true).ok();
    for task in tasks {
        task.await.ok();
    }
    info!("protection core stopped");
    Ok(())
}
