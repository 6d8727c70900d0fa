//! Executor binding shared by both engines
//!
//! Tracks how many callbacks are executing so `stop` can wait for them to
//! drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::warn;

use crate::guard;
use crate::pool::{Executor, Job};

#[derive(Debug, Default)]
struct RunningCounter {
    count: AtomicUsize,
    idle: Notify,
}

impl RunningCounter {
    fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Decrements the running count when dropped, whether the job ran, panicked
/// or was discarded by the executor.
struct RunningGuard(Dispatcher);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.decrement_running();
    }
}

#[derive(Clone)]
pub(crate) struct Dispatcher {
    executor: Arc<dyn Executor>,
    counter: Arc<RunningCounter>,
}

impl Dispatcher {
    pub(crate) fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor, counter: Arc::default() }
    }

    /// Hand `f` to the executor under the panic guard, counted as running
    /// from now until it returns
    pub(crate) fn dispatch_async<F>(&self, context: &'static str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.increment_running();
        let running = RunningGuard(self.clone());
        let job: Job = Box::new(move || {
            let _running = running;
            guard::guard(context, f);
        });

        // A panicking executor drops the job while unwinding, which releases
        // the running count.
        if guard::catch(context, || self.executor.accept(job)).is_err() {
            warn!(context, "Executor panicked during hand-off, callback dropped");
        }
    }

    pub(crate) fn increment_running(&self) {
        self.counter.increment();
    }

    pub(crate) fn decrement_running(&self) {
        self.counter.decrement();
    }

    pub(crate) fn running(&self) -> usize {
        self.counter.count.load(Ordering::Acquire)
    }

    /// Wait until nothing is running; `false` if `timeout` elapsed first
    pub(crate) async fn wait_idle(&self, timeout: Duration) -> bool {
        let counter = &self.counter;
        tokio::time::timeout(timeout, async {
            loop {
                let notified = counter.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if counter.count.load(Ordering::Acquire) == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("running", &self.running()).finish_non_exhaustive()
    }
}
