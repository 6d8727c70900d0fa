//! Task execution and timer scheduling shared across Tablecore services.
//!
//! # Components
//!
//! - [`pool`]: bounded worker pool with fire-and-forget, cancellation-aware
//!   and submit-and-wait entry points, plus the [`Executor`] capability
//! - [`scheduler`]: the [`Scheduler`] contract and its two engines,
//!   [`HeapScheduler`] (sparse, widely varying delays) and [`WheelScheduler`]
//!   (many similar delays on a fixed tick)
//! - [`guard`]: panic recovery used at every execution boundary
//! - [`collections`]: keyed min-heap backing the heap scheduler
//!
//! Game tables, matchmaking loops and alert batching build on these; none of
//! their business rules live here.
//!
//! # Choosing an engine
//!
//! Both engines implement [`Scheduler`], so call sites do not change when the
//! engine does. Prefer the heap engine for a handful of timers whose delays
//! differ by orders of magnitude, and the wheel engine for thousands of
//! timers that share roughly the same period.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod collections;
pub mod error;
pub mod guard;
pub mod pool;
pub mod scheduler;
pub mod testing;
pub mod utils;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use error::{
    ErrorClassification, ErrorSeverity, PoolError, PoolResult, SchedulerError, SchedulerResult,
};
pub use pool::{
    DetachedExecutor, Executor, Fallback, Job, PoolMetrics, PoolState, PoolStatus, TaskPool,
    TaskPoolConfig, TaskPoolConfigBuilder,
};
pub use scheduler::{
    HeapScheduler, HeapSchedulerConfig, MonitorSnapshot, Scheduler, Task, TaskId,
    WheelScheduler, WheelSchedulerConfig,
};
pub use utils::serde::duration_millis;
