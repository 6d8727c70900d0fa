//! Panic recovery for execution boundaries
//!
//! Every closure the pool, the fallback strategy or a scheduler runs on behalf
//! of a caller goes through [`guard`] or [`catch`]. A panic is converted into a
//! logged error (payload plus backtrace) and never unwinds into a worker
//! thread, a control loop or the process.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

/// Render a panic payload the way `std` prints it
///
/// `&str` and `String` payloads are returned verbatim; anything else becomes
/// a fixed placeholder.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Run `f`, turning a panic into `Err("panic: <value>")`
///
/// The recovered value and a backtrace are logged at error level under
/// `context`.
pub fn catch<F, T>(context: &str, f: F) -> Result<T, String>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = format!("panic: {}", panic_message(payload.as_ref()));
        error!(
            context,
            backtrace = %Backtrace::force_capture(),
            "Recovered from {}",
            message
        );
        message
    })
}

/// Run a fire-and-forget closure; returns `false` if it panicked
pub fn guard<F>(context: &str, f: F) -> bool
where
    F: FnOnce(),
{
    catch(context, f).is_ok()
}
