//! Heap scheduler implementation

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::config::HeapSchedulerConfig;
use crate::collections::{HeapItem, KeyedMinHeap};
use crate::error::{SchedulerError, SchedulerResult};
use crate::pool::Executor;
use crate::scheduler::dispatcher::Dispatcher;
use crate::scheduler::supervisor::supervise;
use crate::scheduler::types::IdAllocator;
use crate::scheduler::{MonitorSnapshot, Scheduler, Task, TaskId};

/// Longest the loop sleeps when nothing is queued
const IDLE_CEILING: Duration = Duration::from_secs(3600);

/// Stand-in deadline for delays too large to represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

struct HeapEntry {
    id: TaskId,
    exec_at: Instant,
    interval: Duration,
    repeated: bool,
    cancelled: Arc<AtomicBool>,
    task: Task,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.exec_at == other.exec_at && self.id == other.id
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.exec_at.cmp(&other.exec_at).then_with(|| self.id.cmp(&other.id))
    }
}

impl HeapItem for HeapEntry {
    type Key = TaskId;

    fn key(&self) -> TaskId {
        self.id
    }
}

/// Queued entries plus the cancellation flag of every live id, including
/// repeating entries the loop has popped and not yet re-armed.
#[derive(Default)]
struct TaskQueue {
    heap: KeyedMinHeap<HeapEntry>,
    live: HashMap<TaskId, Arc<AtomicBool>>,
}

struct HeapShared {
    precision: Duration,
    stop_timeout: Duration,
    ids: IdAllocator,
    queue: Mutex<TaskQueue>,
    wake: Notify,
    dispatcher: Dispatcher,
    lifecycle: CancellationToken,
    shutdown: AtomicBool,
}

impl HeapShared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn schedule(&self, delay: Duration, interval: Duration, repeated: bool, task: Task) -> TaskId {
        if self.is_shutdown() {
            warn!("Heap scheduler is stopped, task rejected");
            return TaskId::INVALID;
        }

        let id = self.ids.next_id();
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = HeapEntry {
            id,
            exec_at: deadline_after(Instant::now(), delay),
            interval,
            repeated,
            cancelled: Arc::clone(&cancelled),
            task,
        };

        let position = {
            let mut queue = self.queue.lock();
            // Shutdown flips before the final cancel_all takes this lock.
            if self.is_shutdown() {
                drop(queue);
                warn!("Heap scheduler is stopped, task rejected");
                return TaskId::INVALID;
            }
            queue.live.insert(id, cancelled);
            queue.heap.push(entry)
        };

        if position == 0 {
            self.wake.notify_one();
        }
        debug!(%id, ?delay, repeated, "Scheduled heap timer");
        id
    }

    fn dispatch(&self, task: Task, cancelled: Arc<AtomicBool>) {
        self.dispatcher.dispatch_async("heap_scheduler", move || {
            if !cancelled.load(Ordering::Acquire) {
                task.run();
            }
        });
    }

    fn drain_expired(&self, now: Instant) -> Vec<HeapEntry> {
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        while let Some(entry) = queue.heap.pop_if(|entry| entry.exec_at <= now) {
            due.push(entry);
        }
        due
    }

    /// Re-arm repeating entries and retire finished ones; returns the next
    /// deadline.
    fn rearm(&self, due: Vec<HeapEntry>) -> Option<Instant> {
        let mut queue = self.queue.lock();
        for mut entry in due {
            if entry.repeated && !entry.cancelled.load(Ordering::Acquire) {
                entry.exec_at = deadline_after(entry.exec_at, entry.interval);
                queue.heap.push(entry);
            } else {
                queue.live.remove(&entry.id);
            }
        }
        queue.heap.peek().map(|entry| entry.exec_at)
    }

    fn cancel(&self, id: TaskId) -> bool {
        let mut queue = self.queue.lock();
        let Some(cancelled) = queue.live.remove(&id) else {
            return false;
        };
        cancelled.store(true, Ordering::Release);
        queue.heap.remove(&id);
        true
    }

    fn cancel_all(&self) -> usize {
        let mut queue = self.queue.lock();
        for cancelled in queue.live.values() {
            cancelled.store(true, Ordering::Release);
        }
        let count = queue.live.len();
        *queue = TaskQueue::default();
        count
    }

    fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.lifecycle.cancel();
        let cancelled = self.cancel_all();
        debug!("Heap scheduler shut down, {} entries cancelled", cancelled);
    }
}

async fn run_loop(shared: Arc<HeapShared>) {
    let sleep = tokio::time::sleep(IDLE_CEILING);
    tokio::pin!(sleep);

    loop {
        let now = Instant::now();
        let due = shared.drain_expired(now);
        for entry in &due {
            if !entry.cancelled.load(Ordering::Acquire) {
                shared.dispatch(entry.task.clone(), Arc::clone(&entry.cancelled));
            }
        }

        let next = shared.rearm(due).unwrap_or_else(|| now + IDLE_CEILING);
        sleep.as_mut().reset(next);

        tokio::select! {
            () = shared.lifecycle.cancelled() => {
                shared.shut_down();
                break;
            }
            () = shared.wake.notified() => {}
            () = &mut sleep => {}
        }
    }
    debug!("Heap scheduler loop exited");
}

/// Timer engine backed by a keyed min-heap
///
/// Dispatch order follows the absolute fire time; repeating entries advance
/// from their previous deadline (`exec_at += interval`), not from when they
/// ran, so they do not drift.
pub struct HeapScheduler {
    shared: Arc<HeapShared>,
    stopped: AtomicBool,
}

impl HeapScheduler {
    /// Build the scheduler and start its control loop
    ///
    /// # Errors
    /// - [`SchedulerError::NoRuntime`] outside a tokio runtime
    /// - [`SchedulerError::InvalidConfig`] if the configuration does not validate
    #[instrument(skip_all, fields(precision = ?config.precision))]
    pub fn new<E>(config: HeapSchedulerConfig, executor: E) -> SchedulerResult<Self>
    where
        E: Executor + 'static,
    {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let lifecycle = config
            .lifecycle
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);

        let shared = Arc::new(HeapShared {
            precision: config.precision,
            stop_timeout: config.stop_timeout,
            ids: IdAllocator::new(),
            queue: Mutex::new(TaskQueue::default()),
            wake: Notify::new(),
            dispatcher: Dispatcher::new(Arc::new(executor)),
            lifecycle,
            shutdown: AtomicBool::new(false),
        });

        let looped = Arc::clone(&shared);
        runtime.spawn(async move {
            let lifecycle = looped.lifecycle.clone();
            supervise("heap_scheduler", &lifecycle, || run_loop(Arc::clone(&looped))).await;
        });
        info!("Heap scheduler started");

        Ok(Self { shared, stopped: AtomicBool::new(false) })
    }

    /// Build with [`HeapSchedulerConfig::default`]
    pub fn with_defaults<E>(executor: E) -> SchedulerResult<Self>
    where
        E: Executor + 'static,
    {
        Self::new(HeapSchedulerConfig::default(), executor)
    }

    fn repeat_interval(&self, interval: Duration) -> Duration {
        if interval.is_zero() {
            warn!("Zero repeat interval raised to {:?}", self.shared.precision);
            self.shared.precision
        } else {
            interval
        }
    }
}

#[async_trait]
impl Scheduler for HeapScheduler {
    fn once(&self, delay: Duration, task: Task) -> TaskId {
        self.shared.schedule(delay, Duration::ZERO, false, task)
    }

    fn forever(&self, interval: Duration, task: Task) -> TaskId {
        let interval = self.repeat_interval(interval);
        self.shared.schedule(interval, interval, true, task)
    }

    fn forever_now(&self, interval: Duration, task: Task) -> TaskId {
        let interval = self.repeat_interval(interval);
        let id = self.shared.schedule(interval, interval, true, task.clone());
        if id.is_valid() {
            self.shared.dispatch(task, Arc::new(AtomicBool::new(false)));
        }
        id
    }

    async fn cancel(&self, id: TaskId) -> bool {
        let cancelled = self.shared.cancel(id);
        if cancelled {
            debug!(%id, "Cancelled heap timer");
        }
        cancelled
    }

    fn cancel_all(&self) {
        let count = self.shared.cancel_all();
        debug!("Cancelled {} heap timers", count);
    }

    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            debug!("Heap scheduler already stopped");
            return;
        }

        info!("Stopping heap scheduler");
        self.shared.shut_down();

        if !self.shared.dispatcher.wait_idle(self.shared.stop_timeout).await {
            warn!(
                "Heap scheduler stop timed out after {:?} with {} callbacks running",
                self.shared.stop_timeout,
                self.shared.dispatcher.running()
            );
        }
    }

    fn len(&self) -> usize {
        self.shared.queue.lock().live.len()
    }

    fn running(&self) -> usize {
        self.shared.dispatcher.running()
    }

    fn monitor(&self) -> MonitorSnapshot {
        let (capacity, len) = {
            let queue = self.shared.queue.lock();
            (queue.heap.capacity(), queue.live.len())
        };
        MonitorSnapshot { capacity, len, running: self.running() }
    }
}

impl Drop for HeapScheduler {
    fn drop(&mut self) {
        self.shared.lifecycle.cancel();
    }
}

impl std::fmt::Debug for HeapScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapScheduler")
            .field("monitor", &self.monitor())
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish()
    }
}
