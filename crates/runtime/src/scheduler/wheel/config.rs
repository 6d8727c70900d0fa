//! Wheel scheduler configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::utils::serde::duration_millis;

/// Default tick length
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Default number of buckets
pub const DEFAULT_SLOTS: usize = 512;

/// Default bound on how long `stop` waits for running callbacks
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bound on how long `cancel` waits for an in-flight callback
pub const DEFAULT_CANCEL_WAIT: Duration = Duration::from_millis(100);

/// Configuration for [`crate::scheduler::WheelScheduler`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelSchedulerConfig {
    /// Wheel resolution; deadlines are rounded up to a tick
    #[serde(with = "duration_millis")]
    pub tick: Duration,

    /// Number of buckets; one revolution spans `tick * slots`
    pub slots: usize,

    /// How long `stop` waits for in-flight callbacks before giving up
    #[serde(with = "duration_millis")]
    pub stop_timeout: Duration,

    /// How long `cancel` waits for an in-flight callback of the cancelled task
    #[serde(with = "duration_millis")]
    pub cancel_wait: Duration,

    /// Parent token; cancelling it shuts the scheduler down
    #[serde(skip)]
    pub lifecycle: Option<CancellationToken>,
}

impl Default for WheelSchedulerConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            slots: DEFAULT_SLOTS,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            cancel_wait: DEFAULT_CANCEL_WAIT,
            lifecycle: None,
        }
    }
}

impl WheelSchedulerConfig {
    /// Create a new configuration builder
    pub fn builder() -> WheelSchedulerConfigBuilder {
        WheelSchedulerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.tick.is_zero() {
            return Err("tick must be greater than 0".to_string());
        }
        if self.slots == 0 {
            return Err("slots must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Time covered by one revolution of the wheel
    pub fn span(&self) -> Duration {
        self.tick.saturating_mul(u32::try_from(self.slots).unwrap_or(u32::MAX))
    }
}

/// Builder for [`WheelSchedulerConfig`]
#[derive(Debug, Default)]
pub struct WheelSchedulerConfigBuilder {
    config: WheelSchedulerConfig,
}

impl WheelSchedulerConfigBuilder {
    /// Start from [`WheelSchedulerConfig::default`]
    pub fn new() -> Self {
        Self { config: WheelSchedulerConfig::default() }
    }

    /// Set the wheel resolution
    pub fn tick(mut self, tick: Duration) -> Self {
        self.config.tick = tick;
        self
    }

    /// Set the number of buckets
    pub fn slots(mut self, slots: usize) -> Self {
        self.config.slots = slots;
        self
    }

    /// Set how long `stop` waits for running callbacks
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.stop_timeout = timeout;
        self
    }

    /// Set how long `cancel` waits for an in-flight callback
    pub fn cancel_wait(mut self, wait: Duration) -> Self {
        self.config.cancel_wait = wait;
        self
    }

    /// Tie the scheduler to a parent cancellation token
    pub fn lifecycle(mut self, token: CancellationToken) -> Self {
        self.config.lifecycle = Some(token);
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<WheelSchedulerConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
