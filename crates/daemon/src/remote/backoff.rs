//! Exponential backoff with full jitter for reconnection attempts.

use std::time::Duration;

use rand::Rng;

/// Backoff multiplier between consecutive delays.
const FACTOR: f64 = 2.0;

/// Jitter applied to each delay, as a fraction of the computed value.
const JITTER: f64 = 0.2;

/// Reconnection delay schedule: immediate, then base, base*2, base*4, ...
/// capped and jittered by ±20%.
///
/// The first attempt after a reset is immediate so transient blips recover
/// fast; the schedule only ramps up while the surface stays unreachable.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    /// Creates a schedule with the given base delay and ceiling.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Resets the schedule; the next delay is immediate again.
    ///
    /// Called after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the next delay in the schedule.
    pub fn next_delay<R: Rng>(&mut self, rng: &mut R) -> Duration {
        let attempt = self.attempt;
        self.attempt = self.attempt.saturating_add(1);

        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 1).min(31) as i32;
        let raw = self.base.as_secs_f64() * FACTOR.powi(exponent);
        let capped = raw.min(self.cap.as_secs_f64());
        let jittered = capped * (1.0 + rng.gen_range(-JITTER..=JITTER));

        Duration::from_secs_f64(jittered.max(0.0))
    }
}
