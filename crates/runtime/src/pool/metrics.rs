//! Task pool status and counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pool lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Created but not started; submissions go to the fallback
    Created,
    /// Accepting work
    Running,
    /// Stopped; submissions go to the fallback and the pool cannot restart
    Stopped,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Point-in-time occupancy of the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Configured number of execution units
    pub capacity: usize,
    /// Units currently executing a job
    pub running: usize,
    /// `capacity - running`, never negative
    pub free: usize,
}

impl PoolStatus {
    pub(crate) fn new(capacity: usize, running: usize) -> Self {
        Self { capacity, running, free: capacity.saturating_sub(running) }
    }

    /// Fraction of units busy (0.0 to 1.0); 0.0 for an unstarted pool
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.running as f64 / self.capacity as f64
    }

    /// Whether every unit is busy
    pub fn is_saturated(&self) -> bool {
        self.capacity > 0 && self.free == 0
    }
}

/// Cumulative pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Jobs accepted into the pool queue
    pub submitted: u64,
    /// Jobs that finished on a pool unit (including ones that panicked)
    pub completed: u64,
    /// Jobs that panicked on a pool unit
    pub panicked: u64,
    /// Jobs handed to the fallback strategy
    pub fallbacks: u64,
    /// Subset of `fallbacks` caused by a full queue
    pub rejected: u64,
    /// Jobs dropped because their cancellation token had already fired
    pub dropped: u64,
}

impl PoolMetrics {
    /// Get a human-readable status message
    pub fn status_message(&self) -> String {
        format!(
            "Pool: {} submitted, {} completed, {} panicked, {} fallbacks ({} rejected), {} dropped",
            self.submitted,
            self.completed,
            self.panicked,
            self.fallbacks,
            self.rejected,
            self.dropped
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    fallbacks: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self, panicked: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if panicked {
            self.panicked.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_fallback(&self, rejected: bool) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        if rejected {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolMetrics {
        PoolMetrics {
            submitted: self.submitted.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            panicked: self.panicked.load(Ordering::Acquire),
            fallbacks: self.fallbacks.load(Ordering::Acquire),
            rejected: self.rejected.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
        }
    }
}
