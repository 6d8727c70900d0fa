//! Timer schedulers
//!
//! Two engines behind one [`Scheduler`] contract:
//!
//! - [`HeapScheduler`]: a single control loop over a min-heap ordered by
//!   absolute fire time. Exact (to its precision) for sparse timers with
//!   widely varying delays.
//! - [`WheelScheduler`]: a hashed time wheel quantized to a fixed tick.
//!   Constant-time arming for large numbers of similar periodic timers.
//!
//! Neither engine runs callbacks on its own loop. Due tasks are handed to an
//! [`Executor`](crate::pool::Executor), usually a
//! [`TaskPool`](crate::pool::TaskPool), and run under the panic guard.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tablecore_runtime::scheduler::{Scheduler, Task, WheelScheduler, WheelSchedulerConfig};
//! use tablecore_runtime::{TaskPool, TaskPoolConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Arc::new(TaskPool::new(TaskPoolConfig::default()));
//! pool.start()?;
//!
//! let scheduler: Arc<dyn Scheduler> =
//!     Arc::new(WheelScheduler::new(WheelSchedulerConfig::default(), pool.clone())?);
//! let id = scheduler.forever(Duration::from_secs(1), Task::new(|| println!("tick")));
//!
//! scheduler.cancel(id).await;
//! scheduler.stop().await;
//! # Ok(())
//! # }
//! ```

pub(crate) mod dispatcher;
pub mod heap;
mod supervisor;
mod types;
pub mod wheel;

use std::time::Duration;

use async_trait::async_trait;

pub use heap::{HeapScheduler, HeapSchedulerConfig};
pub use types::{MonitorSnapshot, Task, TaskId};
pub use wheel::{WheelScheduler, WheelSchedulerConfig};

/// Operations shared by every timer engine
///
/// Scheduling calls never block and never fail loudly: once the scheduler has
/// been stopped they return [`TaskId::INVALID`] and log a warning.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`
    fn once(&self, delay: Duration, task: Task) -> TaskId;

    /// Run `task` every `interval`, first after one interval
    fn forever(&self, interval: Duration, task: Task) -> TaskId;

    /// Run `task` immediately, then every `interval`
    fn forever_now(&self, interval: Duration, task: Task) -> TaskId;

    /// Cancel a task; `true` if it was still live
    ///
    /// After this returns the task will not be invoked again. An invocation
    /// already in flight may still be finishing.
    async fn cancel(&self, id: TaskId) -> bool;

    /// Cancel every live task
    fn cancel_all(&self);

    /// Shut the scheduler down
    ///
    /// Idempotent. Cancels all tasks and waits, bounded by the configured
    /// stop timeout, for in-flight callbacks to finish.
    async fn stop(&self);

    /// Live entries
    fn len(&self) -> usize;

    /// `true` when no entries are live
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Callbacks executing right now
    fn running(&self) -> usize;

    /// Capacity, live entries and running callbacks in one snapshot
    fn monitor(&self) -> MonitorSnapshot;
}
