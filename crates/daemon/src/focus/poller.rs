//! Focus poller.
//!
//! Samples the focus source on the configured interval and emits an event
//! whenever the sample differs from the last known state, including
//! transitions to and from "nothing focused". The poller owns all focus
//! state exclusively: the last known application and a bounded in-memory
//! history of recent transitions kept for diagnostics.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::FocusSource;
use crate::store::ConfigStore;

/// Number of focus transitions retained for diagnostics.
pub const HISTORY_LIMIT: usize = 50;

/// Emitted when the focused application changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusEvent {
    /// The newly focused application, `None` when focus moved somewhere
    /// unidentifiable.
    pub app: Option<String>,
}

/// One recorded focus transition.
#[derive(Debug, Clone)]
pub struct FocusTransition {
    /// Previously focused application.
    pub from: Option<String>,
    /// Newly focused application.
    pub to: Option<String>,
    /// When the transition was observed.
    pub at: Instant,
}

/// Timer-driven focus sampler.
pub struct FocusPoller {
    source: Box<dyn FocusSource>,
    store: Arc<ConfigStore>,
    events: mpsc::Sender<FocusEvent>,
    shutdown: CancellationToken,
    last_known: Option<String>,
    history: VecDeque<FocusTransition>,
}

impl FocusPoller {
    /// Creates a poller reading its interval from `store` and emitting
    /// focus-change events into `events`.
    pub fn new(
        source: Box<dyn FocusSource>,
        store: Arc<ConfigStore>,
        events: mpsc::Sender<FocusEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            events,
            shutdown,
            last_known: None,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// Runs the polling loop until shutdown.
    ///
    /// The interval is re-read from the current snapshot at the top of each
    /// tick, so a configuration edit takes effect after at most one stale
    /// interval.
    pub async fn run(mut self) {
        debug!("Focus poller started");

        loop {
            let interval = self.store.current().poll_interval();

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            self.tick();
        }

        debug!("Focus poller stopped");
    }

    /// Performs one sample cycle.
    fn tick(&mut self) {
        let sample = match self.source.query() {
            Ok(sample) => sample,
            Err(e) => {
                // A single missed sample must not be mistaken for the user
                // switching away; treat as no change and retry next tick.
                debug!(error = %e, "Focus query failed, treating as no change");
                return;
            }
        };

        if let Some(event) = self.observe(sample) {
            self.emit(event);
        }
    }

    /// Compares a sample against the last known state, recording the
    /// transition and returning the event to emit if it differs.
    ///
    /// Identical consecutive samples never re-emit. Rapid alternation is
    /// not filtered: every sample that differs from the immediately prior
    /// one is a real event.
    fn observe(&mut self, sample: Option<String>) -> Option<FocusEvent> {
        if sample == self.last_known {
            return None;
        }

        trace!(from = ?self.last_known, to = ?sample, "Focus changed");

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(FocusTransition {
            from: self.last_known.clone(),
            to: sample.clone(),
            at: Instant::now(),
        });

        self.last_known = sample.clone();
        Some(FocusEvent { app: sample })
    }

    fn emit(&self, event: FocusEvent) {
        // try_send keeps the sampling cadence independent of downstream
        // command latency; the channel only fills if the orchestrator is
        // wedged far beyond one human focus change per slot.
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "Focus event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Focus event channel closed");
            }
        }
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &FocusTransition> {
        self.history.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::focus::ScriptedFocusSource;

    fn test_poller(samples: Vec<Option<&str>>) -> (FocusPoller, mpsc::Receiver<FocusEvent>) {
        let store = Arc::new(ConfigStore::new(Config::default()).unwrap());
        let (tx, rx) = mpsc::channel(64);
        let poller = FocusPoller::new(
            Box::new(ScriptedFocusSource::new(samples)),
            store,
            tx,
            CancellationToken::new(),
        );
        (poller, rx)
    }

    fn observed(poller: &mut FocusPoller, sample: Option<&str>) -> Option<FocusEvent> {
        poller.observe(sample.map(str::to_string))
    }

    #[test]
    fn test_emits_on_change_only() {
        let (mut poller, _rx) = test_poller(vec![]);

        assert!(observed(&mut poller, Some("Terminal")).is_some());
        assert!(observed(&mut poller, Some("Terminal")).is_none());
        assert!(observed(&mut poller, Some("Browser")).is_some());
    }

    #[test]
    fn test_initial_none_sample_is_not_a_change() {
        let (mut poller, _rx) = test_poller(vec![]);

        // last known starts as None; sampling None is not a transition.
        assert!(observed(&mut poller, None).is_none());
    }

    #[test]
    fn test_transitions_to_and_from_unknown_emit() {
        let (mut poller, _rx) = test_poller(vec![]);

        assert_eq!(
            observed(&mut poller, Some("Terminal")),
            Some(FocusEvent {
                app: Some("Terminal".to_string())
            })
        );
        assert_eq!(observed(&mut poller, None), Some(FocusEvent { app: None }));
        assert!(observed(&mut poller, None).is_none());
        assert!(observed(&mut poller, Some("Terminal")).is_some());
    }

    #[test]
    fn test_rapid_alternation_is_not_filtered() {
        let (mut poller, _rx) = test_poller(vec![]);

        assert!(observed(&mut poller, Some("A")).is_some());
        assert!(observed(&mut poller, Some("B")).is_some());
        assert!(observed(&mut poller, Some("A")).is_some());
    }

    #[test]
    fn test_query_failure_does_not_change_state() {
        struct FailingSource;
        impl FocusSource for FailingSource {
            fn query(&self) -> Result<Option<String>, crate::focus::QueryError> {
                Err(crate::focus::QueryError::Backend("boom".to_string()))
            }
        }

        let store = Arc::new(ConfigStore::new(Config::default()).unwrap());
        let (tx, mut rx) = mpsc::channel(4);
        let mut poller = FocusPoller::new(
            Box::new(FailingSource),
            store,
            tx,
            CancellationToken::new(),
        );

        poller.tick();
        assert!(poller.last_known.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_scenario_sequence_produces_three_events() {
        let (mut poller, mut rx) = test_poller(vec![
            None,
            Some("Terminal"),
            Some("Browser"),
            Some("Terminal"),
        ]);

        for _ in 0..4 {
            poller.tick();
        }

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event.app);
        }
        assert_eq!(
            events,
            vec![
                Some("Terminal".to_string()),
                Some("Browser".to_string()),
                Some("Terminal".to_string()),
            ]
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let (mut poller, _rx) = test_poller(vec![]);

        for i in 0..(HISTORY_LIMIT + 10) {
            let app = format!("app-{}", i);
            observed(&mut poller, Some(app.as_str()));
        }

        assert_eq!(poller.history().count(), HISTORY_LIMIT);
        let oldest = poller.history().next().unwrap();
        assert_eq!(oldest.to.as_deref(), Some("app-10"));
    }

    #[test]
    fn test_history_records_endpoints() {
        let (mut poller, _rx) = test_poller(vec![]);

        observed(&mut poller, Some("Terminal"));
        observed(&mut poller, Some("Browser"));

        let transitions: Vec<_> = poller.history().collect();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].from, None);
        assert_eq!(transitions[0].to.as_deref(), Some("Terminal"));
        assert_eq!(transitions[1].from.as_deref(), Some("Terminal"));
        assert_eq!(transitions[1].to.as_deref(), Some("Browser"));
    }
}
