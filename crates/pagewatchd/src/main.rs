//! pagewatchd — the pagewatch daemon.
//!
//! Polls every configured endpoint on a fixed frequency and mirrors what
//! it sees onto the status page: component status, a latency metric and
//! incidents.
//!
//! # Usage
//!
//! ```text
//! pagewatchd run --config /etc/pagewatch/config.toml
//! pagewatchd run --config config.toml --once
//! pagewatchd validate --config config.toml
//! ```

mod startup;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,pagewatchd=debug,pagewatch=debug";

#[derive(Parser)]
#[command(name = "pagewatchd", about = "Endpoint monitor for status pages")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll endpoints and update the status page until interrupted.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long, short)]
        config: PathBuf,

        /// Run a single cycle over every endpoint, then exit.
        #[arg(long)]
        once: bool,
    },
    /// Load and validate the configuration without contacting any remote.
    Validate {
        /// Path to the TOML configuration file.
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Run { config, once } => run(&config, once).await,
        Command::Validate { config } => validate(&config),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(path: &Path, once: bool) -> anyhow::Result<()> {
    info!("pagewatch daemon starting");

    let config = startup::load_config(path)?;
    let monitor = startup::build_monitor(&config).await?;

    if once {
        let reports = monitor.poll_once().await;
        for report in &reports {
            info!(
                component_id = report.component_id,
                status = %report.status,
                pushed = report.decision.push,
                incident = ?report.incident_id,
                failed_pushes = report.failed_pushes,
                "cycle complete"
            );
        }
        info!(endpoints = reports.len(), "single cycle finished");
        return Ok(());
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_handle = tokio::spawn(async move {
        monitor.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    monitor_handle.await?;

    info!("pagewatch daemon stopped");
    Ok(())
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let config = startup::load_config(path)?;
    let evaluator = startup::evaluator(&config)?;
    println!(
        "configuration OK: {} component(s), {} expectation(s), every {}s",
        config.components.len(),
        evaluator.expectations().len(),
        config.frequency
    );
    Ok(())
}
