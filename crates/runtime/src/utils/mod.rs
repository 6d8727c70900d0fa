//! Shared helpers
//!
//! - **[`serde`]**: serialization helpers for configuration durations

pub mod serde;

pub use self::serde::duration_millis;
