//! Heap scheduler configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::utils::serde::duration_millis;

/// Default smallest repeat interval
pub const DEFAULT_PRECISION: Duration = Duration::from_millis(10);

/// Default bound on how long `stop` waits for running callbacks
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration for [`crate::scheduler::HeapScheduler`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapSchedulerConfig {
    /// Smallest repeat interval; zero intervals are raised to this
    #[serde(with = "duration_millis")]
    pub precision: Duration,

    /// How long `stop` waits for in-flight callbacks before giving up
    #[serde(with = "duration_millis")]
    pub stop_timeout: Duration,

    /// Parent token; cancelling it shuts the scheduler down
    #[serde(skip)]
    pub lifecycle: Option<CancellationToken>,
}

impl Default for HeapSchedulerConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            lifecycle: None,
        }
    }
}

impl HeapSchedulerConfig {
    /// Create a new configuration builder
    pub fn builder() -> HeapSchedulerConfigBuilder {
        HeapSchedulerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.precision.is_zero() {
            return Err("precision must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Builder for [`HeapSchedulerConfig`]
#[derive(Debug, Default)]
pub struct HeapSchedulerConfigBuilder {
    config: HeapSchedulerConfig,
}

impl HeapSchedulerConfigBuilder {
    /// Start from [`HeapSchedulerConfig::default`]
    pub fn new() -> Self {
        Self { config: HeapSchedulerConfig::default() }
    }

    /// Set the smallest repeat interval
    pub fn precision(mut self, precision: Duration) -> Self {
        self.config.precision = precision;
        self
    }

    /// Set how long `stop` waits for running callbacks
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.stop_timeout = timeout;
        self
    }

    /// Tie the scheduler to a parent cancellation token
    pub fn lifecycle(mut self, token: CancellationToken) -> Self {
        self.config.lifecycle = Some(token);
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<HeapSchedulerConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
