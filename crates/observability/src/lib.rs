//! Tracing/logging setup shared by every keystone binary.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat, init};
