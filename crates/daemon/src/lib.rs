//! # Autoscene Daemon Library
//!
//! Long-running daemon that watches which application holds input focus
//! and switches scenes on a remote control surface (OBS Studio via
//! obs-websocket 5.x) according to a user-edited mapping.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────┐      ┌─────────────┐     ┌─────────────┐   │
//! │  │ FocusPoller │─────▶│ event loop  │────▶│RemoteSession│   │
//! │  └─────────────┘      └─────────────┘     └─────────────┘   │
//! │        │                    │                   │           │
//! │        ▼                    ▼                   ▼           │
//! │  ┌─────────────┐      ┌─────────────┐     WebSocket to      │
//! │  │ FocusSource │      │ ConfigStore │◀─┐  control surface   │
//! │  │ (X11 query) │      └─────────────┘  │                    │
//! │  └─────────────┘                       │                    │
//! │                       ┌──────────────┐ │                    │
//! │                       │ConfigWatcher │─┘ (atomic swaps)     │
//! │                       └──────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Three loops run independently: the focus poller samples the focused
//! application, the config watcher hot-reloads the TOML document, and the
//! remote session keeps the WebSocket alive with backoff. The orchestrator
//! owns their lifecycle and processes focus events one at a time.
//!
//! ## Modules
//!
//! - [`config`]: configuration document loading and validation
//! - [`store`]: atomic configuration snapshot publishing
//! - [`watcher`]: configuration hot reload
//! - [`focus`]: focus sources and the poller
//! - [`remote`]: control surface session with reconnection
//! - [`orchestrator`]: lifecycle and the focus→command event path
//! - [`stats`]: runtime counters
//! - [`logging`]: tracing setup with runtime-reloadable level

pub mod config;
pub mod focus;
pub mod logging;
pub mod orchestrator;
pub mod remote;
pub mod stats;
pub mod store;
pub mod watcher;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{default_config_path, Config, ConfigError};

// Re-export focus types for convenience
pub use focus::{FocusEvent, FocusPoller, FocusSource, QueryError, ScriptedFocusSource};

// Re-export remote types for convenience
pub use remote::{
    CommandError, ConnectionError, ConnectionState, ControlTarget, RemoteSession, SessionOptions,
};

// Re-export orchestrator types for convenience
pub use orchestrator::{
    load_initial_config, Orchestrator, OrchestratorEvent, OrchestratorState, StartupError,
};

// Re-export stats types for convenience
pub use stats::{RuntimeStats, StatsSnapshot};

// Re-export store/watcher types for convenience
pub use store::ConfigStore;
pub use watcher::{ConfigWatcher, DocumentSignature};
