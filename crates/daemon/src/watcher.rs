//! Configuration document watcher.
//!
//! Polls the configuration document on its own timer, independent of the
//! focus poll interval. Each tick compares a cheap modification signature
//! (mtime + size) against the last seen one; only on a signature change is
//! the document read, parsed and validated. A bad edit is logged and
//! discarded, the previously active snapshot stays in force, and the
//! watcher keeps polling for a corrected edit. Nothing on this path is
//! allowed to take down the loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::store::ConfigStore;

/// Modification signature of the configuration document.
///
/// mtime + size is enough to detect external edits without hashing the
/// content on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentSignature {
    mtime: SystemTime,
    len: u64,
}

impl DocumentSignature {
    /// Reads the current signature of the document at `path`.
    pub fn probe(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            mtime: meta.modified()?,
            len: meta.len(),
        })
    }
}

/// Outcome of a single watcher tick, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Document absent or unreadable; check again next tick.
    Unreadable,
    /// Signature matches the last seen one.
    Unchanged,
    /// Document changed and the new snapshot was installed.
    Reloaded,
    /// Document changed but was rejected; prior snapshot retained.
    Rejected,
}

/// Timer-driven configuration reloader.
pub struct ConfigWatcher {
    path: PathBuf,
    store: Arc<ConfigStore>,
    last_signature: Option<DocumentSignature>,
    shutdown: CancellationToken,
}

impl ConfigWatcher {
    /// Creates a watcher for the document at `path`.
    ///
    /// `last_signature` is the signature of the document the initial
    /// snapshot was loaded from, or `None` when the daemon started from
    /// built-in defaults (in which case the first appearance of the file
    /// counts as a change).
    pub fn new(
        path: PathBuf,
        store: Arc<ConfigStore>,
        last_signature: Option<DocumentSignature>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            path,
            store,
            last_signature,
            shutdown,
        }
    }

    /// Runs the watcher loop until shutdown.
    ///
    /// The check interval is re-read from the current snapshot each tick so
    /// a reload of `config_check_interval_ms` takes effect within one cycle.
    pub async fn run(mut self) {
        debug!(path = %self.path.display(), "Config watcher started");

        loop {
            let interval = self.store.current().check_interval();

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            self.tick();
        }

        debug!("Config watcher stopped");
    }

    /// Performs one check cycle: probe signature, reload on change.
    pub fn tick(&mut self) -> TickOutcome {
        let signature = match DocumentSignature::probe(&self.path) {
            Ok(signature) => signature,
            Err(e) => {
                // Mid-edit the document may briefly not exist (editors write
                // via rename). Not fatal; check again next tick.
                debug!(
                    path = %self.path.display(),
                    error = %e,
                    "Config document unreadable, will retry"
                );
                return TickOutcome::Unreadable;
            }
        };

        if self.last_signature == Some(signature) {
            return TickOutcome::Unchanged;
        }

        info!(path = %self.path.display(), "Config document changed, reloading");

        // Remember the signature even when the reload fails: a stable but
        // broken document should not be re-parsed every tick, and the next
        // real edit changes the signature again.
        self.last_signature = Some(signature);

        let candidate = match Config::load(&self.path) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(error = %e, "Config reload failed to parse, keeping previous configuration");
                return TickOutcome::Rejected;
            }
        };

        match self.store.replace(candidate) {
            Ok(()) => {
                let snapshot = self.store.current();
                info!(
                    mappings = snapshot.mappings.len(),
                    poll_interval_ms = snapshot.daemon.poll_interval_ms,
                    "Config reloaded"
                );
                TickOutcome::Reloaded
            }
            Err(e) => {
                warn!(error = %e, "Config reload rejected by validation, keeping previous configuration");
                TickOutcome::Rejected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn watcher_for(dir: &TempDir) -> (ConfigWatcher, Arc<ConfigStore>, PathBuf) {
        let path = dir.path().join("config.toml");
        let store = Arc::new(ConfigStore::new(Config::default()).unwrap());
        let watcher = ConfigWatcher::new(
            path.clone(),
            Arc::clone(&store),
            None,
            CancellationToken::new(),
        );
        (watcher, store, path)
    }

    #[test]
    fn test_missing_document_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, store, _path) = watcher_for(&dir);

        assert_eq!(watcher.tick(), TickOutcome::Unreadable);
        assert_eq!(*store.current(), Config::default());
    }

    #[test]
    fn test_new_document_is_reloaded() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, store, path) = watcher_for(&dir);

        fs::write(&path, "[control]\nhost = \"studio\"\n").unwrap();

        assert_eq!(watcher.tick(), TickOutcome::Reloaded);
        assert_eq!(store.current().control.host, "studio");
    }

    #[test]
    fn test_stable_document_is_not_reparsed() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, _store, path) = watcher_for(&dir);

        fs::write(&path, "[control]\nhost = \"studio\"\n").unwrap();
        assert_eq!(watcher.tick(), TickOutcome::Reloaded);
        assert_eq!(watcher.tick(), TickOutcome::Unchanged);
    }

    #[test]
    fn test_malformed_edit_keeps_prior_snapshot() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, store, path) = watcher_for(&dir);

        fs::write(&path, "[control]\nhost = \"studio\"\n").unwrap();
        assert_eq!(watcher.tick(), TickOutcome::Reloaded);
        let before = store.current();

        fs::write(&path, "[control\nhost =").unwrap();
        assert_eq!(watcher.tick(), TickOutcome::Rejected);
        assert_eq!(*store.current(), *before);
    }

    #[test]
    fn test_invalid_edit_keeps_prior_snapshot() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, store, path) = watcher_for(&dir);

        fs::write(&path, "[daemon]\npoll_interval_ms = 250\n").unwrap();
        assert_eq!(watcher.tick(), TickOutcome::Reloaded);

        fs::write(&path, "[daemon]\npoll_interval_ms = 0\n").unwrap();
        assert_eq!(watcher.tick(), TickOutcome::Rejected);
        assert_eq!(store.current().daemon.poll_interval_ms, 250);
    }

    #[test]
    fn test_broken_document_parsed_once() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, _store, path) = watcher_for(&dir);

        fs::write(&path, "not toml at all [").unwrap();
        assert_eq!(watcher.tick(), TickOutcome::Rejected);
        // Same broken content, same signature: no re-parse.
        assert_eq!(watcher.tick(), TickOutcome::Unchanged);
    }

    #[test]
    fn test_corrected_edit_recovers() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, store, path) = watcher_for(&dir);

        fs::write(&path, "not toml at all [").unwrap();
        assert_eq!(watcher.tick(), TickOutcome::Rejected);

        fs::write(&path, "[mappings]\nkitty = \"terminal\"\n").unwrap();
        assert_eq!(watcher.tick(), TickOutcome::Reloaded);
        assert_eq!(
            store.current().mappings.get("kitty").map(String::as_str),
            Some("terminal")
        );
    }

    #[test]
    fn test_signature_detects_content_growth() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "[control]\n").unwrap();
        let first = DocumentSignature::probe(&path).unwrap();

        fs::write(&path, "[control]\nhost = \"studio\"\n").unwrap();
        let second = DocumentSignature::probe(&path).unwrap();

        assert_ne!(first, second);
    }
}
