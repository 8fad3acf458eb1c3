//! Tracing initialization with a runtime-reloadable filter.
//!
//! The log level comes from three places, strongest first: the `RUST_LOG`
//! environment variable, the `--verbose` flag, and the configuration
//! document's `daemon.log_level`. Only the last is hot-reloadable; when one
//! of the stronger sources is in effect, config reloads leave the filter
//! alone.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Handle for adjusting the log filter while the daemon runs.
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    /// True when RUST_LOG or --verbose pinned the level at startup.
    pinned: bool,
}

/// Installs the global tracing subscriber.
///
/// `initial_level` is used unless `RUST_LOG` is set; `pin` marks the level
/// as operator-chosen so config reloads will not override it.
pub fn init(initial_level: &str, pin: bool) -> Result<LogHandle> {
    let from_env = std::env::var_os("RUST_LOG").is_some();
    let filter = if from_env {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(initial_level)?
    };

    let (filter_layer, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(LogHandle {
        handle,
        pinned: from_env || pin,
    })
}

impl LogHandle {
    /// Applies a new level from a reloaded configuration snapshot.
    ///
    /// A no-op when the level was pinned at startup or the directive does
    /// not parse.
    pub fn set_level(&self, level: &str) {
        if self.pinned {
            return;
        }
        match EnvFilter::try_new(level) {
            Ok(filter) => {
                if let Err(e) = self.handle.reload(filter) {
                    tracing::warn!(error = %e, "Failed to reload log filter");
                }
            }
            Err(e) => {
                tracing::warn!(level, error = %e, "Ignoring invalid log level");
            }
        }
    }

    /// Whether config reloads may change the level.
    pub fn pinned(&self) -> bool {
        self.pinned
    }
}
