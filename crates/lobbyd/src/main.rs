//! lobbyd — the lobbygrid daemon.
//!
//! Single binary that assembles every lobbygrid subsystem:
//! - Control plane
//! - World pool
//! - Orchestrator + lobby facade
//! - Reconciler loop
//! - REST API
//!
//! # Usage
//!
//! ```text
//! lobbyd run --config lobby.toml --port 8440 --simulate
//! lobbyd check-config --config lobby.toml
//! ```

mod simulate;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;

use lobbygrid_control::{ControlPlane, MemoryControlPlane};
use lobbygrid_core::LobbyConfig;
use lobbygrid_pool::{PoolConfig, ResourcePool};
use lobbygrid_proxy::RoutingTable;
use lobbygrid_reconcile::{Reconciler, ReconcilerConfig};
use lobbygrid_scheduler::{Lobby, LogNotifier, Orchestrator, OrchestratorConfig};

use crate::simulate::{Simulator, SimulatorConfig};

#[derive(Parser)]
#[command(name = "lobbyd", about = "lobbygrid daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
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
    /// Run the daemon.
    Run {
        /// Path to lobby.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port for the REST API.
        #[arg(long, default_value = "8440")]
        port: u16,

        /// Run against an in-process simulated cluster.
        #[arg(long)]
        simulate: bool,

        /// Simulated seconds a world takes to pre-generate.
        #[arg(long, default_value = "20")]
        sim_pre_gen_secs: u64,

        /// Simulated seconds a game lasts once ready.
        #[arg(long, default_value = "300")]
        sim_game_secs: u64,
    },

    /// Validate a config file and print the effective configuration.
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,lobbyd=debug,lobbygrid=debug"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    match cli.command {
        Command::Run {
            config,
            port,
            simulate,
            sim_pre_gen_secs,
            sim_game_secs,
        } => {
            let config = load_config(config.as_deref())?;
            let sim = simulate.then(|| SimulatorConfig {
                pre_gen: Duration::from_secs(sim_pre_gen_secs),
                game_length: Duration::from_secs(sim_game_secs),
                ..SimulatorConfig::default()
            });
            run(config, port, sim).await
        }
        Command::CheckConfig { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<LobbyConfig> {
    match path {
        Some(path) => LobbyConfig::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => {
            let mut config = LobbyConfig::default();
            config.apply_env(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
    }
}

async fn run(config: LobbyConfig, port: u16, sim: Option<SimulatorConfig>) -> anyhow::Result<()> {
    let Some(sim) = sim else {
        anyhow::bail!("no cluster backend is built in; pass --simulate to run against a simulated cluster");
    };
    info!(namespace = %config.cluster.namespace, "lobbygrid daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let memory = Arc::new(MemoryControlPlane::new());
    let control: Arc<dyn ControlPlane> = memory.clone();
    info!("simulated control plane initialized");

    let pool = Arc::new(ResourcePool::new(control.clone(), PoolConfig::from_config(&config)));
    info!(
        target_size = config.pool.target_size,
        concurrency = config.pool.generation_concurrency,
        "world pool initialized"
    );

    let routes = RoutingTable::new();

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator = Arc::new(Orchestrator::new(
        control.clone(),
        pool.clone(),
        routes.clone(),
        OrchestratorConfig::from_config(&config),
        shutdown_rx.clone(),
    ));
    let lobby = Lobby::new(orchestrator, Arc::new(LogNotifier));
    info!("orchestrator initialized");

    let reconciler = Reconciler::new(control, pool, routes, ReconcilerConfig::from_config(&config));

    // ── Start background tasks ─────────────────────────────────

    let reconcile_shutdown = shutdown_rx.clone();
    let reconcile_handle = tokio::spawn(async move {
        reconciler.run(reconcile_shutdown).await;
    });

    let simulator = Simulator::new(memory, sim);
    let sim_shutdown = shutdown_rx.clone();
    let sim_handle = tokio::spawn(async move {
        simulator.run(sim_shutdown).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = lobbygrid_api::build_router(lobby);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = reconcile_handle.await;
    let _ = sim_handle.await;

    info!("lobbygrid daemon stopped");
    Ok(())
}
