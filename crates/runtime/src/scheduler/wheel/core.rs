//! Time-wheel scheduler implementation

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::config::WheelSchedulerConfig;
use super::drift::DriftCorrector;
use super::timing_wheel::{Expiry, Reschedule, TimeWheel, TimerHandle};
use crate::error::{SchedulerError, SchedulerResult};
use crate::pool::Executor;
use crate::scheduler::dispatcher::Dispatcher;
use crate::scheduler::supervisor::supervise;
use crate::scheduler::types::IdAllocator;
use crate::scheduler::{MonitorSnapshot, Scheduler, Task, TaskId};

/// How often `cancel` re-checks an in-flight callback
const CANCEL_POLL: Duration = Duration::from_millis(5);

struct WheelEntry {
    id: TaskId,
    timer: TimerHandle,
    cancelled: AtomicBool,
    repeated: bool,
    /// Set once a one-shot has been handed to the executor
    dispatched: AtomicBool,
    active: AtomicUsize,
    task: Task,
    registered_at: Instant,
    delay: Duration,
}

impl WheelEntry {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Flip the cancellation flag and stop the wheel timer; `false` if it was
    /// already cancelled
    fn cancel(&self) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.timer.stop();
        true
    }
}

/// Ends one execution of an entry, even if the executor discards the job
struct Completion {
    entry: Arc<WheelEntry>,
    shared: Weak<WheelShared>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.entry.active.fetch_sub(1, Ordering::AcqRel);
        if !self.entry.repeated {
            if let Some(shared) = self.shared.upgrade() {
                shared.entries.remove_if(&self.entry.id, |_, e| Arc::ptr_eq(e, &self.entry));
            }
        }
    }
}

struct WheelShared {
    wheel: Arc<TimeWheel>,
    stop_timeout: Duration,
    cancel_wait: Duration,
    ids: IdAllocator,
    entries: DashMap<TaskId, Arc<WheelEntry>>,
    dispatcher: Dispatcher,
    lifecycle: CancellationToken,
    shutdown: AtomicBool,
}

impl WheelShared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn schedule(
        self: &Arc<Self>,
        delay: Duration,
        interval: Option<Duration>,
        task: Task,
    ) -> TaskId {
        if self.is_shutdown() {
            warn!("Wheel scheduler is stopped, task rejected");
            return TaskId::INVALID;
        }

        let id = self.ids.next_id();
        let now = Instant::now();
        let entry = Arc::new(WheelEntry {
            id,
            timer: TimerHandle::new(),
            cancelled: AtomicBool::new(false),
            repeated: interval.is_some(),
            dispatched: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            task,
            registered_at: now,
            delay,
        });
        let timer = entry.timer.clone();
        self.entries.insert(id, entry);

        // stop() raises the flag before sweeping the registry.
        if self.is_shutdown() {
            self.entries.remove(&id);
            timer.stop();
            warn!("Wheel scheduler is stopped, task rejected");
            return TaskId::INVALID;
        }

        let reschedule: Option<Reschedule> = interval.map(|interval| {
            let corrector = DriftCorrector::new(interval);
            Arc::new(move |previous: Instant, now: Instant| {
                Some(corrector.next_after(previous, now))
            }) as Reschedule
        });

        let weak = Arc::downgrade(self);
        let deadline = now.checked_add(delay).unwrap_or_else(|| now + self.wheel.tick());
        self.wheel.arm(
            timer,
            deadline,
            reschedule,
            Arc::new(move |expiry| {
                if let Some(shared) = weak.upgrade() {
                    shared.fire(id, expiry);
                }
            }),
        );

        debug!(%id, ?delay, ?interval, "Armed wheel timer");
        id
    }

    fn fire(self: &Arc<Self>, id: TaskId, expiry: Expiry) {
        let Some(entry) = self.entries.get(&id).map(|e| Arc::clone(e.value())) else {
            return;
        };
        if entry.is_cancelled() {
            return;
        }
        if !entry.repeated
            && entry
                .dispatched
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return;
        }

        entry.active.fetch_add(1, Ordering::AcqRel);
        let done = Completion { entry: Arc::clone(&entry), shared: Arc::downgrade(self) };
        let tick = self.wheel.tick();

        self.dispatcher.dispatch_async("wheel_scheduler", move || {
            let done = done;
            let entry = &done.entry;
            if entry.is_cancelled() {
                return;
            }
            if !entry.repeated {
                report_latency(entry, expiry, tick);
            }
            entry.task.run();
        });
    }

    async fn cancel(&self, id: TaskId) -> bool {
        let Some(entry) = self.entries.get(&id).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        if !entry.cancel() {
            return false;
        }

        let deadline = Instant::now() + self.cancel_wait;
        while entry.active.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            tokio::time::sleep(CANCEL_POLL).await;
        }
        let still_running = entry.active.load(Ordering::Acquire);
        if still_running > 0 {
            debug!(%id, "Cancelled wheel timer still has {} callbacks running", still_running);
        }

        self.entries.remove_if(&id, |_, e| Arc::ptr_eq(e, &entry));
        debug!(%id, "Cancelled wheel timer");
        true
    }

    fn cancel_all(&self) -> usize {
        let mut count = 0;
        self.entries.retain(|_, entry| {
            entry.cancel();
            count += 1;
            false
        });
        count
    }

    fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.lifecycle.cancel();
        self.wheel.clear();
        let cancelled = self.cancel_all();
        debug!("Wheel scheduler shut down, {} entries cancelled", cancelled);
    }
}

/// How late a one-shot callback started, split by where the time went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Latency {
    /// Start time past the requested delay
    lag: Duration,
    /// Deadline to the wheel firing the timer
    queue_lag: Duration,
    /// Firing to the callback starting on the executor
    dispatch_lag: Duration,
}

/// `None` while the callback started within one tick of its deadline
fn latency(
    registered_at: Instant,
    delay: Duration,
    expiry: Expiry,
    started: Instant,
    tick: Duration,
) -> Option<Latency> {
    let lag = started.saturating_duration_since(registered_at).saturating_sub(delay);
    if lag <= tick {
        return None;
    }
    Some(Latency {
        lag,
        queue_lag: expiry.fired_at.saturating_duration_since(expiry.deadline),
        dispatch_lag: started.saturating_duration_since(expiry.fired_at),
    })
}

fn report_latency(entry: &WheelEntry, expiry: Expiry, tick: Duration) {
    match latency(entry.registered_at, entry.delay, expiry, Instant::now(), tick) {
        Some(late) => error!(
            id = %entry.id,
            lag = ?late.lag,
            queue_lag = ?late.queue_lag,
            dispatch_lag = ?late.dispatch_lag,
            "Wheel timer ran {:?} late (requested {:?})",
            late.lag,
            entry.delay
        ),
        None => trace!(id = %entry.id, "Wheel timer on time"),
    }
}

async fn drive(shared: Arc<WheelShared>) {
    let lifecycle = shared.lifecycle.clone();
    supervise("wheel_scheduler", &lifecycle, || {
        Arc::clone(&shared.wheel).run(lifecycle.clone())
    })
    .await;
    shared.shut_down();
}

/// Timer engine backed by a hashed time wheel
///
/// Deadlines are quantized up to the wheel tick. Repeating timers stay on the
/// grid of their first deadline; missed periods are skipped, not replayed.
/// Executions of one repeating timer may overlap if a callback outlasts its
/// interval.
pub struct WheelScheduler {
    shared: Arc<WheelShared>,
    stopped: AtomicBool,
}

impl WheelScheduler {
    /// Build the wheel and start its driver
    ///
    /// # Errors
    /// - [`SchedulerError::NoRuntime`] outside a tokio runtime
    /// - [`SchedulerError::InvalidConfig`] for a zero tick or slot count
    #[instrument(skip_all, fields(tick = ?config.tick, slots = config.slots))]
    pub fn new<E>(config: WheelSchedulerConfig, executor: E) -> SchedulerResult<Self>
    where
        E: Executor + 'static,
    {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let lifecycle = config
            .lifecycle
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);

        let shared = Arc::new(WheelShared {
            wheel: Arc::new(TimeWheel::new(config.tick, config.slots)),
            stop_timeout: config.stop_timeout,
            cancel_wait: config.cancel_wait,
            ids: IdAllocator::new(),
            entries: DashMap::new(),
            dispatcher: Dispatcher::new(Arc::new(executor)),
            lifecycle,
            shutdown: AtomicBool::new(false),
        });

        runtime.spawn(drive(Arc::clone(&shared)));
        info!("Wheel scheduler started ({} slots of {:?})", config.slots, config.tick);

        Ok(Self { shared, stopped: AtomicBool::new(false) })
    }

    /// Build with [`WheelSchedulerConfig::default`]
    pub fn with_defaults<E>(executor: E) -> SchedulerResult<Self>
    where
        E: Executor + 'static,
    {
        Self::new(WheelSchedulerConfig::default(), executor)
    }

    fn repeat_interval(&self, interval: Duration) -> Duration {
        let tick = self.shared.wheel.tick();
        if interval.is_zero() {
            warn!("Zero repeat interval raised to {:?}", tick);
            tick
        } else {
            interval
        }
    }
}

#[async_trait]
impl Scheduler for WheelScheduler {
    fn once(&self, delay: Duration, task: Task) -> TaskId {
        self.shared.schedule(delay, None, task)
    }

    fn forever(&self, interval: Duration, task: Task) -> TaskId {
        let interval = self.repeat_interval(interval);
        self.shared.schedule(interval, Some(interval), task)
    }

    fn forever_now(&self, interval: Duration, task: Task) -> TaskId {
        let interval = self.repeat_interval(interval);
        let id = self.shared.schedule(interval, Some(interval), task.clone());
        if id.is_valid() {
            self.shared.dispatcher.dispatch_async("wheel_scheduler", move || task.run());
        }
        id
    }

    async fn cancel(&self, id: TaskId) -> bool {
        self.shared.cancel(id).await
    }

    fn cancel_all(&self) {
        let count = self.shared.cancel_all();
        debug!("Cancelled {} wheel timers", count);
    }

    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            debug!("Wheel scheduler already stopped");
            return;
        }

        info!("Stopping wheel scheduler");
        self.shared.shut_down();

        if !self.shared.dispatcher.wait_idle(self.shared.stop_timeout).await {
            warn!(
                "Wheel scheduler stop timed out after {:?} with {} callbacks running",
                self.shared.stop_timeout,
                self.shared.dispatcher.running()
            );
        }
    }

    fn len(&self) -> usize {
        self.shared.entries.len()
    }

    fn running(&self) -> usize {
        self.shared.dispatcher.running()
    }

    fn monitor(&self) -> MonitorSnapshot {
        MonitorSnapshot { capacity: 0, len: self.len(), running: self.running() }
    }
}

impl Drop for WheelScheduler {
    fn drop(&mut self) {
        self.shared.lifecycle.cancel();
    }
}

impl std::fmt::Debug for WheelScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WheelScheduler")
            .field("monitor", &self.monitor())
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish()
    }
}
