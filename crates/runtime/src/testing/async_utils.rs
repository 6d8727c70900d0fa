//! Async testing utilities
//!
//! Timer tests observe effects that happen on other threads some time later;
//! these helpers poll for them with a bound instead of sleeping blindly.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::future::Future;
use std::time::Duration;

use tokio::time::{error::Elapsed, Instant};

/// Pause between checks of [`assert_eventually_async!`]
pub const EVENTUALLY_POLL: Duration = Duration::from_millis(10);

/// Assert that an async condition turns true before `$timeout`
///
/// `$cond` is re-evaluated on every check, so pass an `async { .. }` block
/// rather than a future bound to a variable.
///
/// ```no_run
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use tablecore_runtime::{Scheduler, Task, WheelScheduler, DetachedExecutor};
///
/// # async fn example() {
/// let scheduler = WheelScheduler::with_defaults(DetachedExecutor).unwrap();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let h = Arc::clone(&hits);
/// scheduler.once(Duration::from_millis(20), Task::new(move || {
///     h.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// tablecore_runtime::assert_eventually_async!(Duration::from_secs(1), async {
///     hits.load(Ordering::SeqCst) == 1
/// });
/// # }
/// ```
#[macro_export]
macro_rules! assert_eventually_async {
    ($timeout:expr, $cond:expr) => {{
        let limit = $timeout;
        let outcome = tokio::time::timeout(limit, async {
            while !$cond.await {
                tokio::time::sleep($crate::testing::EVENTUALLY_POLL).await;
            }
        })
        .await;

        assert!(outcome.is_ok(), "Condition still false after {:?}", limit);
    }};
}

/// Run `fut` with a deadline
pub async fn timeout_ok<F, T>(limit: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut).await
}

/// Check `condition` every `interval` until it holds; `false` if `timeout`
/// passes first
///
/// The condition is checked once more at the deadline, so a state reached
/// during the last sleep is not missed.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Assert `actual` lies in `expected ± tolerance`
pub fn assert_duration_in_range(actual: Duration, expected: Duration, tolerance: Duration) {
    let low = expected.saturating_sub(tolerance);
    let high = expected.saturating_add(tolerance);

    assert!(
        (low..=high).contains(&actual),
        "Duration {:?} not in range [{:?}, {:?}]",
        actual,
        low,
        high
    );
}
