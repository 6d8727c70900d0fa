//! Testing utilities and helpers
//!
//! - **[`async_utils`]**: bounded polling and timing assertions
//! - [`CallRecorder`]: a task body that records when it was invoked
//! - `init_tracing`: installs a test subscriber once per process (feature
//!   `test-utils`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use tablecore_runtime::testing::CallRecorder;
//! use tablecore_runtime::{DetachedExecutor, HeapScheduler, HeapSchedulerConfig, Scheduler};
//!
//! #[tokio::test(flavor = "multi_thread")]
//! async fn test_fires() {
//!     let scheduler =
//!         HeapScheduler::new(HeapSchedulerConfig::default(), DetachedExecutor).unwrap();
//!     let recorder = CallRecorder::new();
//!     scheduler.once(Duration::from_millis(10), recorder.task());
//!
//!     tablecore_runtime::assert_eventually_async!(Duration::from_secs(1), async {
//!         recorder.count() == 1
//!     });
//! }
//! ```

pub mod async_utils;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

pub use async_utils::{assert_duration_in_range, poll_until, timeout_ok, EVENTUALLY_POLL};

use crate::scheduler::Task;

/// Install a `tracing` subscriber for tests
///
/// Honors `RUST_LOG` and defaults to `warn`. Safe to call from every test;
/// only the first call installs anything.
#[cfg(any(test, feature = "test-utils"))]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Records every invocation of the tasks it hands out
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<Instant>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl CallRecorder {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// A task that records the invocation instant
    pub fn task(&self) -> Task {
        let recorder = self.clone();
        Task::new(move || recorder.record())
    }

    /// A task that records, then blocks its executing thread for `hold`
    pub fn slow_task(&self, hold: std::time::Duration) -> Task {
        let recorder = self.clone();
        Task::new(move || {
            let now = recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            recorder.peak.fetch_max(now, Ordering::SeqCst);
            recorder.record();
            std::thread::sleep(hold);
            recorder.in_flight.fetch_sub(1, Ordering::SeqCst);
        })
    }

    fn record(&self) {
        self.calls.lock().push(Instant::now());
    }

    /// Number of recorded invocations
    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Invocation instants in call order
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    /// Highest number of overlapping `slow_task` executions observed
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_repeatable() {
        init_tracing();
        init_tracing();
        tracing::warn!("subscriber installed");
    }

    #[test]
    fn test_recorder_counts_task_runs() {
        let recorder = CallRecorder::new();
        let task = recorder.task();
        task.run();
        task.run();
        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.peak_concurrency(), 0);
    }
}
