//! Hashed time-wheel timer engine
//!
//! A single wheel of `slots` buckets advanced every `tick` by a background
//! driver task. Arming and cancelling are constant time regardless of how
//! many timers are live, at the price of tick-quantized deadlines.

mod config;
mod core;
mod drift;
mod timing_wheel;

pub use config::{
    WheelSchedulerConfig, WheelSchedulerConfigBuilder, DEFAULT_CANCEL_WAIT, DEFAULT_SLOTS,
    DEFAULT_STOP_TIMEOUT, DEFAULT_TICK,
};
pub use core::WheelScheduler;
pub use drift::{DriftCorrector, MAX_DRIFT_STEPS};
