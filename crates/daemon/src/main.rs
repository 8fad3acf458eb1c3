//! Autoscene Daemon
//!
//! Watches input focus and switches control surface scenes.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::logging;
use daemon::orchestrator::{load_initial_config, Orchestrator, OrchestratorEvent};

/// Autoscene daemon - switches control surface scenes when input focus changes.
#[derive(Parser, Debug)]
#[command(name = "autoscene")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration document
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute; defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone, Default)]
pub enum Commands {
    /// Run the daemon until SIGINT/SIGTERM
    #[default]
    Run,

    /// Validate the configuration document and exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log = logging::init(if cli.verbose { "debug" } else { "info" }, cli.verbose)?;

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command.clone().unwrap_or_default() {
        Commands::Run => run(config_path, log).await,
        Commands::Check => check(config_path),
    }
}

/// Runs the daemon until a shutdown signal arrives.
async fn run(config_path: PathBuf, log: logging::LogHandle) -> anyhow::Result<()> {
    tracing::info!(config = %config_path.display(), "Autoscene daemon starting");

    let config = load_initial_config(&config_path);
    log.set_level(&config.daemon.log_level);

    let mut orchestrator = Orchestrator::new(config_path, config)
        .map_err(|e| anyhow::anyhow!("startup failed: {}", e))?
        .with_log_handle(log);

    orchestrator.start().await.map_err(|e| {
        tracing::error!(error = %e, "Startup failed");
        anyhow::anyhow!("startup failed: {}", e)
    })?;

    // Log orchestrator events for the operator.
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                OrchestratorEvent::StateChanged(state) => {
                    tracing::debug!("Orchestrator state: {:?}", state);
                }
                OrchestratorEvent::ConnectionStateChanged(state) => {
                    tracing::info!("Control surface connection: {:?}", state);
                }
                OrchestratorEvent::SceneSwitched { app, scene } => {
                    tracing::info!(%app, %scene, "Switched scene");
                }
                OrchestratorEvent::CommandSkipped { scene } => {
                    tracing::debug!(%scene, "Scene switch skipped while disconnected");
                }
                OrchestratorEvent::CommandFailed { scene, reason } => {
                    tracing::warn!(%scene, %reason, "Scene switch failed");
                }
                OrchestratorEvent::FocusChanged { .. } => {}
            }
        }
    });

    wait_for_shutdown_signal().await;
    tracing::info!("Received shutdown signal");

    orchestrator.stop().await;

    let stats = orchestrator.stats();
    tracing::info!(
        focus_changes = stats.focus_changes,
        commands_sent = stats.commands_sent,
        commands_failed = stats.commands_failed,
        skipped_while_disconnected = stats.skipped_while_disconnected,
        reconnect_attempts = stats.reconnect_attempts,
        "Autoscene daemon stopped"
    );

    Ok(())
}

/// Validates the configuration document, exiting non-zero when unusable.
fn check(config_path: PathBuf) -> anyhow::Result<()> {
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {:#}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("{}: {}", config_path.display(), e);
        std::process::exit(1);
    }

    println!(
        "{}: OK ({} mappings, poll every {}ms)",
        config_path.display(),
        config.mappings.len(),
        config.daemon.poll_interval_ms
    );
    Ok(())
}

/// Waits for SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sigint) => sigint,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register SIGINT handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}
