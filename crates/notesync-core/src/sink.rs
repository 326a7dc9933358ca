//! Crash/error reporting sink.

use crate::Error;

/// Receives errors caught at an engine operation boundary.
pub trait ErrorSink: Send + Sync {
    fn record_error(&self, error: &Error, operation: &str);
}

/// Forwards recorded errors to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn record_error(&self, error: &Error, operation: &str) {
        tracing::error!("{} failed: {} ({:?})", operation, error, error.kind());
    }
}
