//! Runtime statistics.
//!
//! Counters are owned by the orchestrator and incremented on its event
//! path, so they summarize exactly what that path did. External readers
//! only ever get a point-in-time [`StatsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Aggregated daemon counters.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    focus_changes: AtomicU64,
    commands_sent: AtomicU64,
    commands_failed: AtomicU64,
    skipped_while_disconnected: AtomicU64,
    // Milliseconds since the epoch; 0 means "never".
    last_success_ms: AtomicU64,
}

impl RuntimeStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observed focus change.
    pub fn record_focus_change(&self) {
        self.focus_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successfully delivered command.
    pub fn record_command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_success_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Records a command the surface or transport rejected.
    pub fn record_command_failed(&self) {
        self.commands_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a command dropped because no session was available.
    pub fn record_skipped_while_disconnected(&self) {
        self.skipped_while_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view of the counters.
    ///
    /// `reconnect_attempts` is owned by the remote session and folded in
    /// here so callers get one coherent summary.
    pub fn snapshot(&self, reconnect_attempts: u64) -> StatsSnapshot {
        let last_ms = self.last_success_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            focus_changes: self.focus_changes.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            skipped_while_disconnected: self.skipped_while_disconnected.load(Ordering::Relaxed),
            reconnect_attempts,
            last_successful_command: if last_ms == 0 {
                None
            } else {
                Some(UNIX_EPOCH + Duration::from_millis(last_ms))
            },
        }
    }
}

/// Read-only view of [`RuntimeStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Focus-change events observed.
    pub focus_changes: u64,
    /// Scene-switch commands delivered.
    pub commands_sent: u64,
    /// Commands that failed at the surface or transport.
    pub commands_failed: u64,
    /// Commands dropped because the session was down.
    pub skipped_while_disconnected: u64,
    /// Failed connection attempts since startup.
    pub reconnect_attempts: u64,
    /// Wall-clock time of the last delivered command.
    pub last_successful_command: Option<SystemTime>,
}
