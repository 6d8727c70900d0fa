//! Bounded task pool
//!
//! A fixed-capacity set of reusable worker threads. Workers are spawned on
//! demand up to `size`, pick jobs from a shared FIFO queue, and exit after
//! sitting idle for `expiry`. Work the pool cannot take (not started, stopped,
//! queue full) is handed to the configured fallback instead of being dropped.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::config::{Fallback, TaskPoolConfig};
use super::executor::{Executor, Job};
use super::metrics::{PoolCounters, PoolMetrics, PoolState, PoolStatus};
use crate::error::{BoxError, PoolError, PoolResult};
use crate::guard;

/// Bounded worker pool with fallback on rejection
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use tablecore_runtime::pool::{TaskPool, TaskPoolConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = TaskPool::new(TaskPoolConfig::builder().size(4).build()?);
/// pool.start()?;
///
/// pool.post(|| println!("fire and forget"));
///
/// let token = CancellationToken::new();
/// let answer = pool.submit_wait(&token, || Ok::<_, std::io::Error>(6 * 7)).await?;
/// assert_eq!(answer, 42);
///
/// pool.stop();
/// # Ok(())
/// # }
/// ```
pub struct TaskPool {
    config: TaskPoolConfig,
    slot: RwLock<PoolSlot>,
    counters: Arc<PoolCounters>,
}

enum PoolSlot {
    Created,
    Running(Arc<WorkerSet>),
    Stopped,
}

impl TaskPool {
    /// Create an unstarted pool
    pub fn new(config: TaskPoolConfig) -> Self {
        Self { config, slot: RwLock::new(PoolSlot::Created), counters: Arc::default() }
    }

    /// Create an unstarted pool with the default configuration
    pub fn with_defaults() -> Self {
        Self::new(TaskPoolConfig::default())
    }

    /// Build the worker set
    ///
    /// Idempotent: a second call logs a warning and returns `Ok(())`.
    ///
    /// # Errors
    /// - [`PoolError::InvalidConfig`] if the configuration does not validate
    /// - [`PoolError::Spawn`] if the first worker thread cannot be created
    /// - [`PoolError::Closed`] if the pool was already stopped
    #[instrument(skip(self), fields(size = self.config.size, max_queue = self.config.max_queue))]
    pub fn start(&self) -> PoolResult<()> {
        let mut slot = self.slot.write();
        match *slot {
            PoolSlot::Running(_) => {
                warn!("Task pool already started");
                return Ok(());
            }
            PoolSlot::Stopped => return Err(PoolError::Closed),
            PoolSlot::Created => {}
        }

        self.config.validate().map_err(PoolError::InvalidConfig)?;

        let set = Arc::new(WorkerSet::new(&self.config, Arc::clone(&self.counters)));
        // One eager worker surfaces thread creation failures here rather
        // than on the first submission.
        set.queue.lock().workers = 1;
        set.spawn_worker().map_err(|source| {
            error!("Failed to start task pool: {}", source);
            PoolError::Spawn { source }
        })?;

        *slot = PoolSlot::Running(set);
        info!("Task pool started with {} workers", self.config.size);
        Ok(())
    }

    /// Release the pool
    ///
    /// Jobs already accepted still run; new submissions go to the fallback.
    /// Idempotent.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.slot.write(), PoolSlot::Stopped);
        match previous {
            PoolSlot::Running(set) => {
                set.close();
                info!("Task pool stopped");
            }
            PoolSlot::Created => debug!("Task pool stopped before start"),
            PoolSlot::Stopped => debug!("Task pool already stopped"),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        match *self.slot.read() {
            PoolSlot::Created => PoolState::Created,
            PoolSlot::Running(_) => PoolState::Running,
            PoolSlot::Stopped => PoolState::Stopped,
        }
    }

    /// Occupancy computed at call time; zeroed unless running
    pub fn status(&self) -> PoolStatus {
        match &*self.slot.read() {
            PoolSlot::Running(set) => PoolStatus::new(set.capacity, set.running()),
            PoolSlot::Created | PoolSlot::Stopped => PoolStatus::default(),
        }
    }

    /// Jobs accepted but not yet picked up by a worker
    pub fn queued(&self) -> usize {
        match &*self.slot.read() {
            PoolSlot::Running(set) => set.queue.lock().jobs.len(),
            PoolSlot::Created | PoolSlot::Stopped => 0,
        }
    }

    /// Cumulative counters
    pub fn metrics(&self) -> PoolMetrics {
        self.counters.snapshot()
    }

    /// Submit fire-and-forget work
    ///
    /// Never fails from the caller's point of view: when the pool cannot
    /// accept the job it runs through the fallback strategy instead.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_job(Box::new(job));
    }

    /// Submit fire-and-forget work unless `cancel` has already fired
    ///
    /// A job whose token is cancelled at submission time is silently dropped.
    pub fn post_with_cancel<F>(&self, cancel: &CancellationToken, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if cancel.is_cancelled() {
            self.counters.record_dropped();
            return;
        }
        self.post(job);
    }

    /// Run `job` on the pool and wait for its result or for `cancel`
    ///
    /// When `cancel` fires first, the result channel is checked one last time
    /// so a result that raced the cancellation is still returned.
    ///
    /// # Errors
    /// - [`PoolError::Cancelled`] if `cancel` fired before a result arrived
    /// - [`PoolError::Task`] if the job returned an error
    /// - [`PoolError::Panicked`] if the job panicked (`"panic: <value>"`)
    pub async fn submit_wait<F, T, E>(&self, cancel: &CancellationToken, job: F) -> PoolResult<T>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError>,
    {
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        let rx = self.submit_for_result(job);
        await_result(rx, cancel.cancelled(), PoolError::Cancelled).await
    }

    /// Like [`TaskPool::submit_wait`] with a deadline instead of a token
    ///
    /// # Errors
    /// [`PoolError::Timeout`] if no result arrived within `timeout`, otherwise
    /// as [`TaskPool::submit_wait`].
    pub async fn submit_wait_timeout<F, T, E>(&self, timeout: Duration, job: F) -> PoolResult<T>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError>,
    {
        let rx = self.submit_for_result(job);
        await_result(rx, tokio::time::sleep(timeout), PoolError::Timeout(timeout)).await
    }

    fn submit_for_result<F, T, E>(&self, job: F) -> oneshot::Receiver<PoolResult<T>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError>,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move || {
            let result = match guard::catch("submit_wait", job) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(PoolError::task(e)),
                Err(message) => Err(PoolError::Panicked { message }),
            };
            // The waiter may already have given up.
            let _ = tx.send(result);
        });
        rx
    }

    fn post_job(&self, job: Job) {
        let running = match &*self.slot.read() {
            PoolSlot::Running(set) => Some(Arc::clone(set)),
            PoolSlot::Created | PoolSlot::Stopped => None,
        };

        match running {
            Some(set) => set.submit(job),
            None => {
                debug!("Task pool not running, using fallback");
                run_fallback(&self.config.fallback, &self.counters, job, false);
            }
        }
    }
}

impl Executor for TaskPool {
    fn accept(&self, job: Job) {
        self.post_job(job);
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        if let PoolSlot::Running(set) = &*self.slot.read() {
            set.close();
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("state", &self.state())
            .field("status", &self.status())
            .field("config", &self.config)
            .finish()
    }
}

async fn await_result<T>(
    mut rx: oneshot::Receiver<PoolResult<T>>,
    interrupted: impl Future<Output = ()>,
    on_interrupt: PoolError,
) -> PoolResult<T> {
    tokio::select! {
        biased;
        result = &mut rx => result.unwrap_or(Err(PoolError::ResultDropped)),
        () = interrupted => match rx.try_recv() {
            Ok(result) => result,
            Err(_) => Err(on_interrupt),
        },
    }
}

fn run_fallback(fallback: &Fallback, counters: &PoolCounters, job: Job, rejected: bool) {
    counters.record_fallback(rejected);
    let job: Job = Box::new(move || {
        guard::guard("fallback", job);
    });
    guard::guard("fallback_strategy", || fallback(job));
}

struct WorkerSet {
    capacity: usize,
    expiry: Duration,
    max_queue: usize,
    fallback: Fallback,
    queue: Mutex<QueueState>,
    available: Condvar,
    running: AtomicUsize,
    next_worker: AtomicUsize,
    counters: Arc<PoolCounters>,
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    workers: usize,
    idle: usize,
    closed: bool,
}

impl WorkerSet {
    fn new(config: &TaskPoolConfig, counters: Arc<PoolCounters>) -> Self {
        Self {
            capacity: config.size,
            expiry: config.expiry,
            max_queue: config.max_queue,
            fallback: Arc::clone(&config.fallback),
            queue: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            running: AtomicUsize::new(0),
            next_worker: AtomicUsize::new(0),
            counters,
        }
    }

    fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    fn submit(self: &Arc<Self>, job: Job) {
        let mut state = self.queue.lock();
        if state.closed {
            drop(state);
            debug!("Task pool closed, using fallback");
            run_fallback(&self.fallback, &self.counters, job, false);
            return;
        }
        if self.max_queue > 0 && state.jobs.len() >= self.max_queue {
            let queued = state.jobs.len();
            drop(state);
            debug!("Task pool queue full ({} waiting), using fallback", queued);
            run_fallback(&self.fallback, &self.counters, job, true);
            return;
        }

        state.jobs.push_back(job);
        self.counters.record_submitted();

        let grow = state.jobs.len() > state.idle && state.workers < self.capacity;
        if grow {
            state.workers += 1;
        }
        drop(state);

        self.available.notify_one();
        if grow {
            if let Err(e) = self.spawn_worker() {
                self.worker_spawn_failed(&e);
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>) -> std::io::Result<()> {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let set = Arc::clone(self);
        thread::Builder::new()
            .name(format!("tablecore-pool-{id}"))
            .spawn(move || set.worker_loop())
            .map(|_| ())
    }

    fn worker_spawn_failed(&self, err: &std::io::Error) {
        let orphaned: Vec<Job> = {
            let mut state = self.queue.lock();
            state.workers -= 1;
            if state.workers == 0 {
                state.jobs.drain(..).collect()
            } else {
                Vec::new()
            }
        };

        error!("Failed to spawn pool worker: {} ({} jobs rerouted)", err, orphaned.len());
        for job in orphaned {
            run_fallback(&self.fallback, &self.counters, job, false);
        }
    }

    fn worker_loop(&self) {
        debug!("Pool worker started");
        while let Some(job) = self.next_job() {
            self.running.fetch_add(1, Ordering::AcqRel);
            let completed = guard::guard("task_pool", job);
            self.running.fetch_sub(1, Ordering::AcqRel);
            self.counters.record_completed(!completed);
        }
        debug!("Pool worker exiting");
    }

    fn next_job(&self) -> Option<Job> {
        let mut state = self.queue.lock();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.closed {
                state.workers -= 1;
                return None;
            }

            state.idle += 1;
            let timed_out = self.available.wait_for(&mut state, self.expiry).timed_out();
            state.idle -= 1;

            if timed_out && state.jobs.is_empty() {
                state.workers -= 1;
                return None;
            }
        }
    }

    fn close(&self) {
        self.queue.lock().closed = true;
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    use super::*;

    fn small_pool(size: usize) -> TaskPool {
        TaskPool::new(TaskPoolConfig::builder().size(size).build().unwrap())
    }

    #[test]
    fn test_start_is_idempotent() {
        let pool = small_pool(2);
        assert_eq!(pool.state(), PoolState::Created);
        assert!(pool.start().is_ok());
        assert!(pool.start().is_ok());
        assert_eq!(pool.state(), PoolState::Running);
        assert_eq!(pool.status().capacity, 2);
        pool.stop();
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let config = TaskPoolConfig { size: 0, ..TaskPoolConfig::default() };
        let pool = TaskPool::new(config);
        assert!(matches!(pool.start(), Err(PoolError::InvalidConfig(_))));
        assert_eq!(pool.state(), PoolState::Created);
    }

    #[test]
    fn test_stop_is_idempotent_and_final() {
        let pool = small_pool(2);
        pool.start().unwrap();
        pool.stop();
        pool.stop();
        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(pool.status(), PoolStatus::default());
        assert!(matches!(pool.start(), Err(PoolError::Closed)));
    }

    #[test]
    fn test_status_zero_when_never_started() {
        let pool = small_pool(3);
        assert_eq!(pool.status(), PoolStatus::default());
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_post_runs_on_pool_thread() {
        let pool = small_pool(2);
        pool.start().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        pool.post(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        });

        let name = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert!(name.starts_with("tablecore-pool-"));
        pool.stop();
    }

    #[test]
    fn test_post_before_start_uses_fallback() {
        let used = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&used);
        let config = TaskPoolConfig::builder()
            .size(1)
            .fallback(move |job| {
                flag.store(true, Ordering::SeqCst);
                job();
            })
            .build()
            .unwrap();
        let pool = TaskPool::new(config);

        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        pool.post(move || r.store(true, Ordering::SeqCst));

        assert!(used.load(Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(pool.metrics().fallbacks, 1);
    }

    #[test]
    fn test_panicking_fallback_stays_inside_post() {
        let config = TaskPoolConfig::builder()
            .size(1)
            .fallback(|_job| panic!("fallback refused the job"))
            .build()
            .unwrap();
        let pool = TaskPool::new(config);

        pool.post(|| {});
        pool.post(|| {});

        assert_eq!(pool.metrics().fallbacks, 2);
    }

    #[test]
    fn test_full_queue_uses_fallback() {
        let config = TaskPoolConfig::builder()
            .size(1)
            .max_queue(1)
            .fallback(|job| job())
            .build()
            .unwrap();
        let pool = TaskPool::new(config);
        pool.start().unwrap();

        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        pool.post(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        started_rx.recv_timeout(Duration::from_secs(1)).unwrap();

        pool.post(|| {});
        // Queue now holds one job; the next goes to the fallback.
        pool.post(|| {});

        let metrics = pool.metrics();
        assert_eq!(metrics.rejected, 1);
        assert_eq!(metrics.fallbacks, 1);
        release_tx.send(()).unwrap();
        pool.stop();
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = small_pool(1);
        pool.start().unwrap();

        pool.post(|| panic!("job exploded"));
        let (tx, rx) = std::sync::mpsc::channel();
        pool.post(move || tx.send(()).unwrap());

        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        while pool.metrics().completed < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.metrics().panicked, 1);
        pool.stop();
    }

    #[test]
    fn test_idle_workers_expire() {
        let config = TaskPoolConfig::builder()
            .size(4)
            .expiry(Duration::from_millis(20))
            .build()
            .unwrap();
        let pool = TaskPool::new(config);
        pool.start().unwrap();

        let set = match &*pool.slot.read() {
            PoolSlot::Running(set) => Arc::clone(set),
            _ => panic!("pool should be running"),
        };

        let deadline = Instant::now() + Duration::from_secs(1);
        while set.queue.lock().workers > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(set.queue.lock().workers, 0);

        // Work still runs after every unit expired.
        let (tx, rx) = std::sync::mpsc::channel();
        pool.post(move || tx.send(()).unwrap());
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        pool.stop();
    }

    #[test]
    fn test_post_with_cancelled_token_is_dropped() {
        let pool = small_pool(1);
        pool.start().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        pool.post_with_cancel(&token, move || r.store(true, Ordering::SeqCst));

        thread::sleep(Duration::from_millis(20));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(pool.metrics().dropped, 1);
        pool.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_wait_returns_value() {
        let pool = small_pool(2);
        pool.start().unwrap();
        let token = CancellationToken::new();

        let value = pool.submit_wait(&token, || Ok::<_, std::io::Error>(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
        pool.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_wait_propagates_job_error() {
        let pool = small_pool(2);
        pool.start().unwrap();
        let token = CancellationToken::new();

        let result: PoolResult<u32> = pool.submit_wait(&token, || Err("seat taken")).await;
        match result {
            Err(PoolError::Task(e)) => assert_eq!(e.to_string(), "seat taken"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        pool.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_wait_converts_panic() {
        let pool = small_pool(1);
        pool.start().unwrap();
        let token = CancellationToken::new();

        let result: PoolResult<()> =
            pool.submit_wait(&token, || -> Result<(), String> { panic!("dealer crashed") }).await;
        match result {
            Err(PoolError::Panicked { message }) => assert_eq!(message, "panic: dealer crashed"),
            other => panic!("unexpected result: {:?}", other),
        }
        pool.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_wait_already_cancelled() {
        let pool = small_pool(1);
        pool.start().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = pool.submit_wait(&token, || Ok::<_, String>(1)).await;
        assert!(matches!(result, Err(PoolError::Cancelled)));
        pool.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_wait_timeout() {
        let pool = small_pool(1);
        pool.start().unwrap();

        let started = Instant::now();
        let result = pool
            .submit_wait_timeout(Duration::from_millis(10), || {
                thread::sleep(Duration::from_millis(200));
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(result, Err(PoolError::Timeout(d)) if d == Duration::from_millis(10)));
        assert!(started.elapsed() < Duration::from_millis(150));
        pool.stop();
    }
}
