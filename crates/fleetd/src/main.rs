//! fleetd — the FleetGrid daemon.
//!
//! Single binary that assembles the cluster controller:
//! - Configuration and blueprints (fleet.toml)
//! - Cluster controller and eviction poller
//! - Provider event loop
//! - Simulated resource provider
//! - REST API
//!
//! # Usage
//!
//! ```text
//! fleetd run --config fleet.toml --port 8460
//! fleetd check-config --config fleet.toml
//! ```

mod sim;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use fleetgrid_controller::ClusterController;
use fleetgrid_core::FleetConfig;
use fleetgrid_grid::ProjectionRegistry;

use crate::sim::SimulatedProvider;

#[derive(Parser)]
#[command(name = "fleetd", about = "FleetGrid cluster controller daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller with the built-in simulated provider.
    Run {
        /// Path to fleet.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on. Overrides `[api] port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Parse and validate a config file, then exit.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { config, port } => run(config.as_deref(), port).await,
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,fleetd=debug,fleetgrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FleetConfig> {
    let config = match path {
        Some(path) => FleetConfig::from_file(path)?,
        None => FleetConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = load_config(Some(path))?;
    let registry = ProjectionRegistry::new();
    let mut instantiable = 0;
    for (id, blueprint) in config.instantiable_blueprints() {
        registry
            .create(blueprint.spec.clone())
            .with_context(|| format!("blueprint {id}"))?;
        instantiable += 1;
    }
    info!(
        path = %path.display(),
        blueprints = config.blueprints.len(),
        instantiable,
        "config ok"
    );
    Ok(())
}

async fn run(config_path: Option<&Path>, port: Option<u16>) -> anyhow::Result<()> {
    info!("FleetGrid daemon starting");

    let config = load_config(config_path)?;
    let simulator = config.simulator.clone().unwrap_or_default();
    let fulfil_interval = Duration::from_millis(simulator.fulfil_interval_ms.max(1));

    // ── Initialize subsystems ──────────────────────────────────

    let (event_tx, event_rx) = mpsc::channel(1024);
    let provider = Arc::new(SimulatedProvider::new(simulator, event_tx));
    let controller = ClusterController::from_config(&config, provider.clone());
    controller.start().await?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let poller_handle = {
        let controller = controller.clone();
        let shutdown = shutdown_rx.clone();
        let interval = config.controller.poll_interval();
        tokio::spawn(async move { controller.run_poller(interval, shutdown).await })
    };

    let events_handle = {
        let controller = controller.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { controller.run_events(event_rx, shutdown).await })
    };

    let provider_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { provider.run(fulfil_interval, shutdown).await })
    };

    // ── Start API server ───────────────────────────────────────

    let router = fleetgrid_api::build_router(controller);
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.api.port)));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = poller_handle.await;
    let _ = events_handle.await;
    let _ = provider_handle.await;

    info!("FleetGrid daemon stopped");
    Ok(())
}
