//! Error types for processor pool supervision.
//!
//! The processing loop itself never fails with these: handler failures are
//! policy and unexpected failures go to the caller's error hook. What is
//! left are the supervision-level conditions a pool can hit while shutting
//! down its tasks.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by processor pool supervision.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Graceful shutdown exceeded its deadline.
    #[error("shutdown timed out after {timeout:?}, some processors may still be running")]
    ShutdownTimeout {
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// A processor task panicked.
    #[error("processor {processor_id} panicked: {message}")]
    ProcessorPanic {
        /// Identifier of the panicked processor
        processor_id: usize,
        /// The join error description
        message: String,
    },
}
