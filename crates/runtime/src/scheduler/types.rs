//! Identifiers, task bodies and monitor snapshots shared by both engines

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a scheduled task
///
/// Unique for the lifetime of the scheduler that issued it and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Returned when a scheduler refuses a task (it has been stopped)
    pub const INVALID: TaskId = TaskId(0);

    /// Raw numeric value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// `false` only for [`TaskId::INVALID`]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Monotonic id source; the first id handed out is 1
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub(crate) fn next_id(&self) -> TaskId {
        TaskId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// A schedulable callback
///
/// Cheap to clone; repeating timers invoke the same body every period.
#[derive(Clone)]
pub struct Task(Arc<dyn Fn() + Send + Sync + 'static>);

impl Task {
    /// Wrap a callback
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the body on the current thread
    pub fn run(&self) {
        (self.0)();
    }
}

impl<F> From<F> for Task
where
    F: Fn() + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task(..)")
    }
}

/// Point-in-time view of a scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Allocated queue capacity; always 0 for the wheel engine
    pub capacity: usize,
    /// Live (scheduled, not yet completed or cancelled) entries
    pub len: usize,
    /// Callbacks executing right now
    pub running: usize,
}

impl MonitorSnapshot {
    /// No entries queued and nothing executing
    pub fn is_idle(&self) -> bool {
        self.len == 0 && self.running == 0
    }
}
