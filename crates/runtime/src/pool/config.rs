//! Task pool configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::executor::{spawn_detached, Job};
use crate::utils::serde::duration_millis;

/// Strategy invoked with a job the pool could not accept
pub type Fallback = Arc<dyn Fn(Job) + Send + Sync>;

/// Default number of execution units
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Default idle time after which an execution unit exits
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(10);

/// Configuration for [`crate::pool::TaskPool`]
#[derive(Clone, Serialize, Deserialize)]
pub struct TaskPoolConfig {
    /// Maximum number of execution units (threads) running jobs at once
    pub size: usize,

    /// How long an idle execution unit waits for work before exiting
    #[serde(with = "duration_millis")]
    pub expiry: Duration,

    /// Maximum number of accepted jobs waiting for a free unit; 0 is unbounded
    pub max_queue: usize,

    /// Where jobs go when the pool is not running or the queue is full
    #[serde(skip, default = "default_fallback")]
    pub fallback: Fallback,
}

fn default_fallback() -> Fallback {
    Arc::new(spawn_detached)
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            expiry: DEFAULT_EXPIRY,
            max_queue: 0,
            fallback: default_fallback(),
        }
    }
}

impl fmt::Debug for TaskPoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPoolConfig")
            .field("size", &self.size)
            .field("expiry", &self.expiry)
            .field("max_queue", &self.max_queue)
            .finish_non_exhaustive()
    }
}

impl TaskPoolConfig {
    /// Create a new configuration builder
    pub fn builder() -> TaskPoolConfigBuilder {
        TaskPoolConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.size == 0 {
            return Err("size must be greater than 0".to_string());
        }
        if self.expiry.is_zero() {
            return Err("expiry must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Builder for [`TaskPoolConfig`]
#[derive(Debug, Default)]
pub struct TaskPoolConfigBuilder {
    config: TaskPoolConfig,
}

impl TaskPoolConfigBuilder {
    /// Start from [`TaskPoolConfig::default`]
    pub fn new() -> Self {
        Self { config: TaskPoolConfig::default() }
    }

    /// Set the number of execution units
    pub fn size(mut self, size: usize) -> Self {
        self.config.size = size;
        self
    }

    /// Set how long an idle unit lingers before exiting
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.config.expiry = expiry;
        self
    }

    /// Cap the jobs waiting for a unit; 0 leaves the queue unbounded
    pub fn max_queue(mut self, max_queue: usize) -> Self {
        self.config.max_queue = max_queue;
        self
    }

    /// Route jobs the pool cannot take to `fallback`
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(Job) + Send + Sync + 'static,
    {
        self.config.fallback = Arc::new(fallback);
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<TaskPoolConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
