//! Caller-supplied hooks: item handler, error handler, trace sink.
//!
//! The engine is deliberately ignorant of the payload's business meaning and
//! of error policy. Both are injected through the narrow traits defined
//! here, keeping dispatch explicit instead of routing through globals.

use std::{future::Future, pin::Pin};

use crate::{
    error::{CoreError, HandlerError},
    item::QueueItem,
};

/// The business operation invoked per dequeued item.
///
/// An `Err` is a handler failure: the engine leaves the message for
/// redelivery or dead-letters it based on the dequeue count, and never
/// escalates the error past the loop. The engine imposes no timeout;
/// handlers enforce their own if needed.
pub trait ItemHandler<T>: Send + Sync + 'static {
    /// Processes one decoded item.
    fn handle<'a>(
        &'a self,
        item: &'a QueueItem<T>,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

/// Decides whether the loop survives an unexpected failure.
///
/// Invoked for failures inside the loop's own plumbing (transport errors,
/// decode failures, delete failures), never for handler failures. Returning
/// `true` keeps the loop running; `false` stops it.
///
/// Halting the whole processor on the first unexpected error is rarely the
/// right production policy; prefer [`ContinueOnError`] unless a supervisor
/// restarts the processor externally.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Reports an unexpected error; the returned future resolves to whether
    /// the loop should continue.
    fn on_error(&self, error: CoreError) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// Error handler that keeps the loop running on any unexpected error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueOnError;

impl ErrorHandler for ContinueOnError {
    fn on_error(&self, _error: CoreError) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async { true })
    }
}

/// Error handler that stops the loop on the first unexpected error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOnError;

impl ErrorHandler for StopOnError {
    fn on_error(&self, _error: CoreError) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async { false })
    }
}

/// Best-effort sink for human-readable trace lines.
///
/// Receives one line per notable transition (poll empty, item handled, item
/// dead-lettered, item dropped, unexpected error). Observability only: it
/// must never affect control flow and is never required for correctness.
/// Implementations must not panic back into the loop.
pub trait TraceSink: Send + Sync + 'static {
    /// Accepts one trace line.
    fn trace(&self, line: &str);
}

impl<F> TraceSink for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn trace(&self, line: &str) {
        self(line);
    }
}

/// Trace sink that discards all lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTraceSink;

impl TraceSink for NoOpTraceSink {
    fn trace(&self, _line: &str) {}
}
