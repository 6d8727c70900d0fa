//! Restart-on-panic for engine control tasks

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Run the task built by `spawn_loop` until it returns normally
///
/// A panicking task is respawned from a fresh `spawn_loop()` unless
/// `lifecycle` has already been cancelled. Returns the number of restarts.
pub(crate) async fn supervise<F, Fut>(
    name: &'static str,
    lifecycle: &CancellationToken,
    mut spawn_loop: F,
) -> u32
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut restarts = 0;
    loop {
        match tokio::spawn(spawn_loop()).await {
            Ok(()) => break,
            Err(e) if e.is_panic() && !lifecycle.is_cancelled() => {
                restarts += 1;
                error!(name, restarts, "Control loop panicked, restarting: {}", e);
            }
            Err(e) => {
                debug!(name, "Control loop ended: {}", e);
                break;
            }
        }
    }
    restarts
}
