//! Scripted handlers and recording hooks for engine tests.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use conveyor_core::{CoreError, ErrorHandler, HandlerError, ItemHandler, QueueItem, TraceSink};

/// Handler that fails its first `fail_first` invocations and succeeds
/// afterwards.
///
/// `fail_first: 0` always succeeds; `u32::MAX` effectively always fails.
#[derive(Debug, Default)]
pub struct ScriptedHandler {
    fail_first: u32,
    calls: AtomicU32,
}

impl ScriptedHandler {
    /// Creates a handler failing the first `fail_first` calls.
    pub fn failing_first(fail_first: u32) -> Self {
        Self { fail_first, calls: AtomicU32::new(0) }
    }

    /// Creates a handler that always succeeds.
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    /// Total number of invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T> ItemHandler<T> for ScriptedHandler
where
    T: Send + Sync + 'static,
{
    fn handle<'a>(
        &'a self,
        _item: &'a QueueItem<T>,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = call < self.fail_first;
        Box::pin(async move {
            if fail {
                Err(HandlerError::new(format!("scripted failure on call {call}")))
            } else {
                Ok(())
            }
        })
    }
}

/// Handler that fails every invocation.
#[derive(Debug, Default)]
pub struct AlwaysFailHandler {
    calls: AtomicU32,
}

impl AlwaysFailHandler {
    /// Creates the handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T> ItemHandler<T> for AlwaysFailHandler
where
    T: Send + Sync + 'static,
{
    fn handle<'a>(
        &'a self,
        _item: &'a QueueItem<T>,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(HandlerError::new("scripted permanent failure")) })
    }
}

/// Handler that succeeds and records every payload it sees.
#[derive(Debug)]
pub struct RecordingHandler<T> {
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T> RecordingHandler<T> {
    /// Creates the handler.
    pub fn new() -> Self {
        Self { seen: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl<T: Clone> RecordingHandler<T> {
    /// Payloads handled so far, in order.
    pub fn seen(&self) -> Vec<T> {
        self.seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl<T> Default for RecordingHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ItemHandler<T> for RecordingHandler<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn handle<'a>(
        &'a self,
        item: &'a QueueItem<T>,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(item.payload.clone());
        Box::pin(async { Ok(()) })
    }
}

/// Error handler that records every unexpected error and answers with a
/// fixed continue/stop policy.
#[derive(Debug)]
pub struct RecordingErrorHandler {
    keep_running: bool,
    errors: Arc<Mutex<Vec<CoreError>>>,
}

impl RecordingErrorHandler {
    /// Creates a recording handler that keeps the loop running.
    pub fn continuing() -> Self {
        Self { keep_running: true, errors: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Creates a recording handler that stops the loop on first error.
    pub fn stopping() -> Self {
        Self { keep_running: false, errors: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Errors reported so far, in order.
    pub fn errors(&self) -> Vec<CoreError> {
        self.errors.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn on_error(&self, error: CoreError) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        self.errors.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(error);
        let keep_running = self.keep_running;
        Box::pin(async move { keep_running })
    }
}

/// Trace sink that records every line it receives.
#[derive(Debug, Default)]
pub struct RecordingTraceSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingTraceSink {
    /// Creates the sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines received so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl TraceSink for RecordingTraceSink {
    fn trace(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(line.to_string());
    }
}
