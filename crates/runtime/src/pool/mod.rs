//! Bounded task pool and the executor capability
//!
//! - [`TaskPool`]: fixed number of reusable worker threads with a fallback
//!   for work it cannot take
//! - [`Executor`]: what the schedulers hand due callbacks to
//! - [`DetachedExecutor`]: one throwaway thread per job

mod config;
mod core;
mod executor;
mod metrics;

pub use config::{
    Fallback, TaskPoolConfig, TaskPoolConfigBuilder, DEFAULT_EXPIRY, DEFAULT_POOL_SIZE,
};
pub use core::TaskPool;
pub use executor::{spawn_detached, DetachedExecutor, Executor, Job};
pub use metrics::{PoolMetrics, PoolState, PoolStatus};
