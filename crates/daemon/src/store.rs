//! Shared configuration snapshot store.
//!
//! The store is the only piece of state read by more than one component.
//! It holds the latest validated [`Config`] behind a tokio watch channel:
//! readers borrow the current `Arc<Config>` without blocking, the writer
//! (the config watcher) swaps the whole snapshot atomically. A reader
//! observes either the pre-swap or the post-swap snapshot, never a mix.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::{Config, ConfigError};

/// Atomic publish point for configuration snapshots.
pub struct ConfigStore {
    tx: watch::Sender<Arc<Config>>,
}

impl ConfigStore {
    /// Creates a store holding an already-validated initial snapshot.
    pub fn new(initial: Config) -> Result<Self, ConfigError> {
        initial.validate()?;
        let (tx, _) = watch::channel(Arc::new(initial));
        Ok(Self { tx })
    }

    /// Returns the latest validated snapshot.
    ///
    /// Cheap enough to call on every focus event; never blocks against an
    /// in-progress swap.
    pub fn current(&self) -> Arc<Config> {
        self.tx.borrow().clone()
    }

    /// Validates and atomically installs a new snapshot.
    ///
    /// On validation failure the store is unchanged and the error is
    /// returned to the caller.
    pub fn replace(&self, candidate: Config) -> Result<(), ConfigError> {
        candidate.validate()?;
        self.tx.send_replace(Arc::new(candidate));
        Ok(())
    }

    /// Subscribes to snapshot swaps.
    ///
    /// Used by the orchestrator to react to connection-target and log-level
    /// changes without polling.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.tx.subscribe()
    }
}
