//! Heap scheduler integration tests

mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use support::init_tracing;
use tablecore_runtime::testing::{assert_duration_in_range, poll_until, CallRecorder};
use tablecore_runtime::{
    HeapScheduler, HeapSchedulerConfig, Scheduler, Task, TaskPool, TaskPoolConfig,
};

fn pool(size: usize) -> Arc<TaskPool> {
    let pool = Arc::new(TaskPool::new(TaskPoolConfig::builder().size(size).build().unwrap()));
    pool.start().unwrap();
    pool
}

/// Validates a single one-shot on an idle heap scheduler.
///
/// # Test Steps
/// 1. Schedule `once(100ms)` on an idle scheduler
/// 2. Wait for it to fire
/// 3. Verify it fired once, no earlier than 100ms and within precision plus
///    scheduling slack
#[tokio::test(flavor = "multi_thread")]
async fn test_once_fires_on_time() {
    init_tracing();
    let pool = pool(4);
    let scheduler = HeapScheduler::new(HeapSchedulerConfig::default(), Arc::clone(&pool)).unwrap();
    let recorder = CallRecorder::new();

    let registered = Instant::now();
    scheduler.once(Duration::from_millis(100), recorder.task());

    assert!(
        poll_until(Duration::from_secs(2), Duration::from_millis(5), || {
            let recorder = recorder.clone();
            async move { recorder.count() == 1 }
        })
        .await
    );
    let fired = recorder.calls()[0].duration_since(registered);
    assert!(fired >= Duration::from_millis(100), "fired early after {fired:?}");
    assert_duration_in_range(fired, Duration::from_millis(130), Duration::from_millis(30));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recorder.count(), 1);
    scheduler.stop().await;
    pool.stop();
}

/// Validates dispatch order follows deadlines regardless of insertion order.
///
/// # Test Steps
/// 1. Schedule ten one-shots with shuffled delays on a single-unit pool
/// 2. Wait for all of them
/// 3. Verify they ran in ascending delay order
#[tokio::test(flavor = "multi_thread")]
async fn test_dispatch_follows_deadlines() {
    let pool = pool(1);
    let scheduler = HeapScheduler::new(HeapSchedulerConfig::default(), Arc::clone(&pool)).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    for delay in [90_u64, 30, 150, 60, 120, 10, 180, 45, 75, 105] {
        let order = Arc::clone(&order);
        scheduler.once(Duration::from_millis(delay), Task::new(move || order.lock().push(delay)));
    }

    assert!(
        poll_until(Duration::from_secs(2), Duration::from_millis(10), || {
            let order = Arc::clone(&order);
            async move { order.lock().len() == 10 }
        })
        .await
    );

    let observed = order.lock().clone();
    let mut sorted = observed.clone();
    sorted.sort_unstable();
    assert_eq!(observed, sorted);
    scheduler.stop().await;
    pool.stop();
}

/// Validates that repeating tasks stay on their original grid.
///
/// # Test Steps
/// 1. Schedule `forever(40ms)` with a callback that takes 15ms
/// 2. Record five invocations
/// 3. Verify the Nth invocation lands near `T0 + N * 40ms`
#[tokio::test(flavor = "multi_thread")]
async fn test_repeating_does_not_drift() {
    let pool = pool(4);
    let scheduler = HeapScheduler::new(HeapSchedulerConfig::default(), Arc::clone(&pool)).unwrap();
    let recorder = CallRecorder::new();

    let start = Instant::now();
    let id = scheduler
        .forever(Duration::from_millis(40), recorder.slow_task(Duration::from_millis(15)));

    assert!(
        poll_until(Duration::from_secs(2), Duration::from_millis(5), || {
            let recorder = recorder.clone();
            async move { recorder.count() >= 5 }
        })
        .await
    );
    scheduler.cancel(id).await;

    let calls = recorder.calls();
    let fifth = calls[4].duration_since(start);
    assert_duration_in_range(fifth, Duration::from_millis(215), Duration::from_millis(35));
    scheduler.stop().await;
    pool.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_times_out_on_stuck_callback() {
    let pool = pool(2);
    let config =
        HeapSchedulerConfig::builder().stop_timeout(Duration::from_millis(50)).build().unwrap();
    let scheduler = HeapScheduler::new(config, Arc::clone(&pool)).unwrap();
    let recorder = CallRecorder::new();

    scheduler.once(Duration::ZERO, recorder.slow_task(Duration::from_millis(400)));
    assert!(
        poll_until(Duration::from_secs(1), Duration::from_millis(2), || {
            let recorder = recorder.clone();
            async move { recorder.count() == 1 }
        })
        .await
    );

    let started = Instant::now();
    scheduler.stop().await;
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(scheduler.running(), 1);
    pool.stop();
}
