//! Focus sources: where the daemon learns which application has input focus.
//!
//! A [`FocusSource`] is a point-in-time query against OS state. The poller
//! treats it as a black box: `Ok(Some(id))` is a stable application
//! identifier, `Ok(None)` means nothing identifiable is focused, and
//! `Err(_)` is a transient platform failure that must not be mistaken for
//! a focus change.

mod poller;
mod x11;

use std::collections::VecDeque;
use std::sync::Mutex;

use thiserror::Error;

pub use poller::{FocusEvent, FocusPoller, FocusTransition, HISTORY_LIMIT};
pub use x11::X11FocusSource;

/// Transient failure while querying the platform for the focused app.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The display server connection is gone.
    #[error("focus backend disconnected: {0}")]
    Disconnected(String),

    /// The query itself failed; the next tick may succeed.
    #[error("focus query failed: {0}")]
    Backend(String),
}

/// Point-in-time query for the focused application's identifier.
pub trait FocusSource: Send + Sync {
    /// Returns the focused application's stable identifier, `None` if
    /// nothing identifiable is focused.
    fn query(&self) -> Result<Option<String>, QueryError>;
}

/// A focus source that replays a scripted sequence of samples.
///
/// Once the script is exhausted it keeps returning the last sample.
/// Used by the integration tests to drive the poller deterministically;
/// samples can be appended while the daemon runs.
pub struct ScriptedFocusSource {
    samples: Mutex<ScriptState>,
}

struct ScriptState {
    pending: VecDeque<Option<String>>,
    last: Option<String>,
}

impl ScriptedFocusSource {
    /// Creates a source that replays `samples` in order.
    pub fn new<I, S>(samples: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            samples: Mutex::new(ScriptState {
                pending: samples
                    .into_iter()
                    .map(|s| s.map(Into::into))
                    .collect(),
                last: None,
            }),
        }
    }

    /// Appends a sample to the end of the script.
    pub fn push(&self, sample: Option<&str>) {
        let mut state = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        state.pending.push_back(sample.map(str::to_string));
    }
}

impl FocusSource for ScriptedFocusSource {
    fn query(&self) -> Result<Option<String>, QueryError> {
        let mut state = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sample) = state.pending.pop_front() {
            state.last = sample;
        }
        Ok(state.last.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_source_replays_in_order() {
        let source = ScriptedFocusSource::new([None::<&str>, Some("Terminal"), Some("Browser")]);

        assert_eq!(source.query().unwrap(), None);
        assert_eq!(source.query().unwrap(), Some("Terminal".to_string()));
        assert_eq!(source.query().unwrap(), Some("Browser".to_string()));
    }

    #[test]
    fn test_scripted_source_repeats_last_sample() {
        let source = ScriptedFocusSource::new([Some("Terminal")]);

        assert_eq!(source.query().unwrap(), Some("Terminal".to_string()));
        assert_eq!(source.query().unwrap(), Some("Terminal".to_string()));
    }

    #[test]
    fn test_scripted_source_accepts_live_pushes() {
        let source = ScriptedFocusSource::new(Vec::<Option<String>>::new());
        assert_eq!(source.query().unwrap(), None);

        source.push(Some("Emacs"));
        assert_eq!(source.query().unwrap(), Some("Emacs".to_string()));
    }
}
