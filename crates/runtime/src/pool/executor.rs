//! The executor capability
//!
//! Schedulers never run callbacks on their own control loop; they hand them to
//! an [`Executor`]. [`crate::pool::TaskPool`] is the usual implementation,
//! [`DetachedExecutor`] spawns a throwaway thread per job.

use std::sync::Arc;
use std::thread;

use tracing::error;

use crate::guard;

/// A unit of fire-and-forget work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Anything that accepts a job for asynchronous execution
pub trait Executor: Send + Sync {
    /// Run `job` at some point on another thread; must not block the caller
    fn accept(&self, job: Job);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn accept(&self, job: Job) {
        (**self).accept(job);
    }
}

/// Executor that runs every job on its own detached, untracked thread
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedExecutor;

impl Executor for DetachedExecutor {
    fn accept(&self, job: Job) {
        spawn_detached(job);
    }
}

/// Run `job` on a new detached thread under the panic guard
///
/// This is the task pool's default fallback. If the OS refuses to create the
/// thread the failure is logged and the job is dropped.
pub fn spawn_detached(job: Job) {
    let spawned = thread::Builder::new().name("tablecore-detached".to_string()).spawn(move || {
        guard::guard("detached", job);
    });

    if let Err(e) = spawned {
        error!("Failed to spawn detached thread, job dropped: {}", e);
    }
}
