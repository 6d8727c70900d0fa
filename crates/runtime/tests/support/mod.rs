//! Shared helpers for `tablecore-runtime` integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use tablecore_runtime::{DetachedExecutor, Executor, Job};
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honoring `RUST_LOG` (default `warn`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Executor whose first hand-off panics; later jobs run on detached threads
#[derive(Debug, Default)]
pub struct FailFirstExecutor {
    failed: AtomicBool,
}

impl Executor for FailFirstExecutor {
    fn accept(&self, job: Job) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            panic!("executor refused the job");
        }
        DetachedExecutor.accept(job);
    }
}
