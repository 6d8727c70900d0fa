//! Next-fire calculation for repeating wheel timers

use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

/// Upper bound on whole intervals skipped in one correction
pub const MAX_DRIFT_STEPS: u32 = 10_000;

/// Keeps a repeating timer on its original grid
///
/// The next deadline is the first `previous + k * interval` strictly after
/// `now`, so a late firing neither shifts later deadlines nor causes a burst
/// of catch-up firings.
#[derive(Debug, Clone, Copy)]
pub struct DriftCorrector {
    interval: Duration,
}

impl DriftCorrector {
    /// Corrector for a timer repeating every `interval`
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Repeat interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// First grid point after `now`, starting from `previous`
    ///
    /// If that is more than [`MAX_DRIFT_STEPS`] intervals away (a suspended
    /// process, a clock jump) the grid is abandoned and `now + interval` is
    /// returned.
    pub fn next_after(&self, previous: Instant, now: Instant) -> Instant {
        let mut next = previous;
        for _ in 0..MAX_DRIFT_STEPS {
            match next.checked_add(self.interval) {
                Some(candidate) => next = candidate,
                None => break,
            }
            if next > now {
                return next;
            }
        }

        warn!(
            "Drift correction gave up after {} steps of {:?}, resyncing to now",
            MAX_DRIFT_STEPS, self.interval
        );
        now + self.interval
    }
}
