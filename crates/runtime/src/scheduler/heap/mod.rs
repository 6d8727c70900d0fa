//! Min-heap timer engine
//!
//! One control loop sleeps until the earliest deadline, dispatches everything
//! due, re-arms repeating entries and goes back to sleep. Scheduling a new
//! earliest deadline wakes it early.

mod config;
mod core;

pub use config::{
    HeapSchedulerConfig, HeapSchedulerConfigBuilder, DEFAULT_PRECISION, DEFAULT_STOP_TIMEOUT,
};
pub use core::HeapScheduler;
