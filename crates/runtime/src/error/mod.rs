//! Error types for the task pool and the timer schedulers
//!
//! Only faults a caller actually awaits surface as errors here: a pool that
//! cannot be built, a submit-and-wait that was cancelled or whose job failed,
//! and a scheduler constructed in the wrong context. Everything else (panics
//! in fire-and-forget work, rejected submissions, late timers) is recovered
//! locally and reported through `tracing`.
//!
//! # Classification
//!
//! Both error enums implement [`ErrorClassification`] so callers can decide
//! uniformly whether to retry and how loudly to report:
//!
//! | Error | Retryable | Severity |
//! |-------|-----------|----------|
//! | `PoolError::InvalidConfig` | no | Error |
//! | `PoolError::Spawn` | yes | Error |
//! | `PoolError::Closed` | no | Warning |
//! | `PoolError::Cancelled` / `Timeout` | yes | Info / Warning |
//! | `PoolError::Panicked` | no | Critical |
//! | `PoolError::Task` | no | Error |
//! | `SchedulerError::NoRuntime` | no | Critical |
//! | `SchedulerError::InvalidConfig` | no | Error |
//!
//! ```rust
//! use tablecore_runtime::error::{ErrorClassification, ErrorSeverity, PoolError};
//!
//! let err = PoolError::Cancelled;
//! assert!(err.is_retryable());
//! assert_eq!(err.severity(), ErrorSeverity::Info);
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed error carried by jobs that return their own error type
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for task pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Result type for scheduler construction
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors produced by [`crate::pool::TaskPool`]
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool configuration was rejected at start
    #[error("Invalid task pool configuration: {0}")]
    InvalidConfig(String),

    /// An execution unit could not be created
    #[error("Failed to spawn pool worker: {source}")]
    Spawn {
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The pool was stopped and cannot be started again
    #[error("Task pool is closed")]
    Closed,

    /// The waiter's cancellation token fired before a result arrived
    #[error("Task cancelled before its result was delivered")]
    Cancelled,

    /// The waiter's deadline passed before a result arrived
    #[error("Task did not complete within {0:?}")]
    Timeout(Duration),

    /// The job panicked; the message has the form `panic: <value>`
    #[error("{message}")]
    Panicked {
        /// Rendered panic payload
        message: String,
    },

    /// The job ran and returned its own error
    #[error("Task failed: {0}")]
    Task(#[source] BoxError),

    /// The job was dropped without producing a result
    #[error("Task result channel closed without a result")]
    ResultDropped,
}

impl PoolError {
    /// Wrap a job's own error
    pub fn task<E: Into<BoxError>>(err: E) -> Self {
        Self::Task(err.into())
    }

    /// Returns `true` when the waiter gave up (cancellation or deadline)
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }
}

/// Errors produced while constructing a scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler must be created from within a tokio runtime
    #[error("Scheduler requires a running tokio runtime")]
    NoRuntime,

    /// The configuration was rejected
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}

/// Standard classification interface for runtime errors
pub trait ErrorClassification {
    /// Whether repeating the operation could succeed
    fn is_retryable(&self) -> bool;

    /// Severity used for reporting
    fn severity(&self) -> ErrorSeverity;

    /// Whether the error signals a broken invariant needing attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorClassification for PoolError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::Cancelled | Self::Timeout(_))
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidConfig(_) => ErrorSeverity::Error,
            Self::Spawn { .. } => ErrorSeverity::Error,
            Self::Closed => ErrorSeverity::Warning,
            Self::Cancelled => ErrorSeverity::Info,
            Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Panicked { .. } => ErrorSeverity::Critical,
            Self::Task(_) => ErrorSeverity::Error,
            Self::ResultDropped => ErrorSeverity::Error,
        }
    }
}

impl ErrorClassification for SchedulerError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoRuntime => ErrorSeverity::Critical,
            Self::InvalidConfig(_) => ErrorSeverity::Error,
        }
    }
}
