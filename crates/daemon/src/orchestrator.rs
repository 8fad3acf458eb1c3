//! Daemon orchestrator wiring together all components.
//!
//! The orchestrator owns the lifecycle of the focus poller, the config
//! watcher and the remote session, and runs the single event path that
//! turns focus changes into scene-switch commands. Focus events are
//! processed strictly one at a time, in the order the poller observed
//! them, so rapid switches produce commands in exactly that order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigError};
use crate::focus::{FocusEvent, FocusPoller, FocusSource, QueryError, X11FocusSource};
use crate::logging::LogHandle;
use crate::remote::{
    CommandError, ConnectionState, ControlTarget, RemoteSession, SessionOptions,
};
use crate::stats::{RuntimeStats, StatsSnapshot};
use crate::store::ConfigStore;
use crate::watcher::{ConfigWatcher, DocumentSignature};

/// Grace period for loops to observe the shutdown flag.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the focus event channel between poller and orchestrator.
const FOCUS_EVENT_BUFFER: usize = 64;

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Initial and terminal state.
    Stopped,
    /// Components are being brought up.
    Starting,
    /// Steady state, focus events are being handled.
    Running,
    /// Shutdown in progress, loops are draining.
    Stopping,
}

/// Fatal startup failures.
///
/// Everything past startup degrades gracefully instead of exiting; only
/// these abort the daemon.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Neither the document nor the built-in defaults yielded a valid
    /// configuration.
    #[error("no usable configuration: {0}")]
    NoUsableConfig(#[from] ConfigError),

    /// The platform focus source could not be initialized.
    #[error("focus source unavailable: {0}")]
    FocusSourceUnavailable(#[from] QueryError),
}

/// Events emitted by the orchestrator for observers (logging, tests).
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Lifecycle state changed.
    StateChanged(OrchestratorState),
    /// A focus change was observed.
    FocusChanged {
        /// Newly focused application, if identifiable.
        app: Option<String>,
    },
    /// A scene switch was delivered to the surface.
    SceneSwitched {
        /// The application that triggered the switch.
        app: String,
        /// The scene switched to.
        scene: String,
    },
    /// A scene switch was dropped because the session was down.
    CommandSkipped {
        /// The scene that would have been switched to.
        scene: String,
    },
    /// A scene switch failed at the surface or transport.
    CommandFailed {
        /// The scene the switch targeted.
        scene: String,
        /// Failure description.
        reason: String,
    },
    /// The control surface connection state changed.
    ConnectionStateChanged(ConnectionState),
}

/// Top-level daemon coordinator.
pub struct Orchestrator {
    config_path: PathBuf,
    store: Arc<ConfigStore>,
    stats: Arc<RuntimeStats>,
    state: Arc<RwLock<OrchestratorState>>,
    shutdown: CancellationToken,
    event_tx: broadcast::Sender<OrchestratorEvent>,
    session_options: SessionOptions,
    session: Option<Arc<RemoteSession>>,
    focus_source: Option<Box<dyn FocusSource>>,
    log_handle: Option<LogHandle>,
    initial_signature: Option<DocumentSignature>,
    tasks: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Creates an orchestrator from an already-resolved initial snapshot.
    ///
    /// `config_path` is watched for edits even when the initial load fell
    /// back to defaults, so a document created later is picked up.
    pub fn new(config_path: PathBuf, initial: Config) -> Result<Self, StartupError> {
        let initial_signature = DocumentSignature::probe(&config_path).ok();
        let store = Arc::new(ConfigStore::new(initial)?);
        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            config_path,
            store,
            stats: Arc::new(RuntimeStats::new()),
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            shutdown: CancellationToken::new(),
            event_tx,
            session_options: SessionOptions::default(),
            session: None,
            focus_source: None,
            log_handle: None,
            initial_signature,
            tasks: Vec::new(),
        })
    }

    /// Replaces the platform focus source (used by tests).
    pub fn with_focus_source(mut self, source: Box<dyn FocusSource>) -> Self {
        self.focus_source = Some(source);
        self
    }

    /// Attaches the log reload handle so config edits can retune verbosity.
    pub fn with_log_handle(mut self, handle: LogHandle) -> Self {
        self.log_handle = Some(handle);
        self
    }

    /// Overrides session timing (used by tests).
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.session_options = options;
        self
    }

    /// The shared configuration store.
    pub fn store(&self) -> Arc<ConfigStore> {
        Arc::clone(&self.store)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Current control surface connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Returns a receiver for orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// Point-in-time statistics summary.
    pub fn stats(&self) -> StatsSnapshot {
        let reconnects = self
            .session
            .as_ref()
            .map(|s| s.reconnect_attempts())
            .unwrap_or(0);
        self.stats.snapshot(reconnects)
    }

    /// Starts all components.
    ///
    /// Returns once the daemon is running; the control surface connection
    /// is established in the background and may still be pending.
    pub async fn start(&mut self) -> Result<(), StartupError> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                debug!("Orchestrator already started");
                return Ok(());
            }
            *state = OrchestratorState::Starting;
        }
        self.emit(OrchestratorEvent::StateChanged(OrchestratorState::Starting));

        info!("Starting orchestrator");

        let source: Box<dyn FocusSource> = match self.focus_source.take() {
            Some(source) => source,
            None => Box::new(X11FocusSource::connect()?),
        };

        let snapshot = self.store.current();
        let session = RemoteSession::spawn(
            ControlTarget::from(&snapshot.control),
            self.session_options.clone(),
            self.shutdown.child_token(),
        );
        self.session = Some(Arc::clone(&session));

        let (focus_tx, focus_rx) = mpsc::channel(FOCUS_EVENT_BUFFER);

        let poller = FocusPoller::new(
            source,
            Arc::clone(&self.store),
            focus_tx,
            self.shutdown.child_token(),
        );
        self.tasks.push(tokio::spawn(poller.run()));

        let watcher = ConfigWatcher::new(
            self.config_path.clone(),
            Arc::clone(&self.store),
            self.initial_signature,
            self.shutdown.child_token(),
        );
        self.tasks.push(tokio::spawn(watcher.run()));

        self.tasks.push(tokio::spawn(event_loop(
            focus_rx,
            Arc::clone(&self.store),
            Arc::clone(&session),
            Arc::clone(&self.stats),
            self.event_tx.clone(),
            self.shutdown.child_token(),
        )));

        self.tasks.push(tokio::spawn(config_reactor(
            self.store.subscribe(),
            Arc::clone(&session),
            self.log_handle.take(),
            self.shutdown.child_token(),
        )));

        self.tasks.push(tokio::spawn(forward_connection_state(
            session.state_changes(),
            self.event_tx.clone(),
            self.shutdown.child_token(),
        )));

        {
            let mut state = self.state.write().await;
            *state = OrchestratorState::Running;
        }
        self.emit(OrchestratorEvent::StateChanged(OrchestratorState::Running));

        info!(
            mappings = snapshot.mappings.len(),
            poll_interval_ms = snapshot.daemon.poll_interval_ms,
            "Orchestrator running"
        );
        Ok(())
    }

    /// Stops all components and waits for their loops to drain.
    pub async fn stop(&mut self) {
        {
            let mut state = self.state.write().await;
            if *state == OrchestratorState::Stopped {
                return;
            }
            *state = OrchestratorState::Stopping;
        }
        self.emit(OrchestratorEvent::StateChanged(OrchestratorState::Stopping));

        info!("Stopping orchestrator");
        self.shutdown.cancel();

        for task in self.tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Component did not stop within grace period");
            }
        }
        self.session = None;

        {
            let mut state = self.state.write().await;
            *state = OrchestratorState::Stopped;
        }
        self.emit(OrchestratorEvent::StateChanged(OrchestratorState::Stopped));

        info!("Orchestrator stopped");
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Loads the initial configuration, falling back to built-in defaults.
///
/// A missing document is normal; a broken or invalid one is logged at
/// ERROR and replaced by defaults so the daemon still comes up. The result
/// has environment overrides applied.
pub fn load_initial_config(path: &std::path::Path) -> Config {
    let mut config = match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration, using built-in defaults");
            Config::default()
        }
    };

    config.apply_env_overrides();

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration invalid, using built-in defaults");
        config = Config::default();
    }

    config
}

/// Handles focus events one at a time, in observation order.
async fn event_loop(
    mut focus_rx: mpsc::Receiver<FocusEvent>,
    store: Arc<ConfigStore>,
    session: Arc<RemoteSession>,
    stats: Arc<RuntimeStats>,
    event_tx: broadcast::Sender<OrchestratorEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = focus_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        handle_focus_event(event, &store, &session, &stats, &event_tx).await;
    }

    debug!("Event loop stopped");
}

async fn handle_focus_event(
    event: FocusEvent,
    store: &ConfigStore,
    session: &RemoteSession,
    stats: &RuntimeStats,
    event_tx: &broadcast::Sender<OrchestratorEvent>,
) {
    stats.record_focus_change();
    let _ = event_tx.send(OrchestratorEvent::FocusChanged {
        app: event.app.clone(),
    });

    let Some(app) = event.app else {
        debug!("Focus moved to an unidentifiable window");
        return;
    };

    // Read the mapping from the *current* snapshot on every event so a
    // hot-reloaded mapping applies to the very next focus change.
    let snapshot = store.current();
    let Some(scene) = snapshot.mappings.get(&app) else {
        // Deliberately leaves the surface untouched rather than switching
        // to some default scene.
        debug!(%app, "No scene mapping for focused application");
        return;
    };

    info!(%app, %scene, "Focus changed to mapped application");

    match session.send_command(scene).await {
        Ok(()) => {
            stats.record_command_sent();
            let _ = event_tx.send(OrchestratorEvent::SceneSwitched {
                app,
                scene: scene.clone(),
            });
        }
        Err(CommandError::NotConnected) => {
            // Dropped, not queued: the next focus change after reconnect
            // will carry the then-current state.
            stats.record_skipped_while_disconnected();
            debug!(%scene, "Scene switch skipped while disconnected");
            let _ = event_tx.send(OrchestratorEvent::CommandSkipped {
                scene: scene.clone(),
            });
        }
        Err(e) => {
            stats.record_command_failed();
            warn!(%scene, error = %e, "Scene switch failed");
            let _ = event_tx.send(OrchestratorEvent::CommandFailed {
                scene: scene.clone(),
                reason: e.to_string(),
            });
        }
    }
}

/// Applies configuration swaps to the running components.
async fn config_reactor(
    mut config_rx: tokio::sync::watch::Receiver<Arc<Config>>,
    session: Arc<RemoteSession>,
    log_handle: Option<LogHandle>,
    shutdown: CancellationToken,
) {
    let mut last = config_rx.borrow().clone();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = config_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let current = config_rx.borrow_and_update().clone();

        if current.control != last.control {
            session
                .update_target(ControlTarget::from(&current.control))
                .await;
        }

        if current.daemon.log_level != last.daemon.log_level {
            if let Some(handle) = &log_handle {
                info!(level = %current.daemon.log_level, "Applying reloaded log level");
                handle.set_level(&current.daemon.log_level);
            }
        }

        last = current;
    }

    debug!("Config reactor stopped");
}

/// Forwards connection state transitions into the orchestrator event bus.
async fn forward_connection_state(
    mut state_rx: tokio::sync::watch::Receiver<ConnectionState>,
    event_tx: broadcast::Sender<OrchestratorEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let state = *state_rx.borrow_and_update();
        let _ = event_tx.send(OrchestratorEvent::ConnectionStateChanged(state));
    }
}
