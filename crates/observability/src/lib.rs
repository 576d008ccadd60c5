//! Tracing/logging setup shared by worker processes.

/// Subscriber installation (format selection, env filter).
pub mod tracing;

pub use crate::tracing::{LogFormat, init, init_for_tests, init_with};
