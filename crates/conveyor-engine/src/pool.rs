//! Processor pool with supervised lifecycle.
//!
//! Spawns several processors over one transport for throughput, each with
//! its own backoff state, and manages graceful shutdown. The transport's
//! lease semantics are what keep concurrent processors from observing the
//! same undelivered message; the pool adds no locking of its own.

use std::{sync::Arc, time::Duration};

use conveyor_core::{
    Clock, DeadLetterSink, ErrorHandler, ItemCodec, ItemHandler, QueueTransport, RealClock,
    TraceSink,
};
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{EngineError, Result},
    processor::{ProcessorConfig, ProcessorStats, QueueProcessor, StopReason},
};

/// Supervised pool of queue processors.
///
/// Construct with the shared collaborators, attach optional ones with the
/// `with_*` methods, then `spawn_processors`. Dropping a pool with live
/// processors force-cancels them; prefer `shutdown_graceful`.
pub struct ProcessorPool<T> {
    transport: Arc<dyn QueueTransport>,
    codec: Arc<dyn ItemCodec<T>>,
    handler: Arc<dyn ItemHandler<T>>,
    error_handler: Arc<dyn ErrorHandler>,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
    trace: Option<Arc<dyn TraceSink>>,
    config: ProcessorConfig,
    stats: Arc<RwLock<ProcessorStats>>,
    cancellation_token: CancellationToken,
    clock: Arc<dyn Clock>,
    handles: Vec<JoinHandle<StopReason>>,
}

impl<T> ProcessorPool<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a pool over the given transport, codec, handler, and error
    /// policy.
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        codec: Arc<dyn ItemCodec<T>>,
        handler: Arc<dyn ItemHandler<T>>,
        error_handler: Arc<dyn ErrorHandler>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            transport,
            codec,
            handler,
            error_handler,
            dead_letter: None,
            trace: None,
            config,
            stats: Arc::new(RwLock::new(ProcessorStats::default())),
            cancellation_token: CancellationToken::new(),
            clock: Arc::new(RealClock),
            handles: Vec::new(),
        }
    }

    /// Attaches a dead-letter destination shared by all processors.
    #[must_use]
    pub fn with_dead_letter(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    /// Attaches a trace sink shared by all processors.
    #[must_use]
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    /// Replaces the clock, primarily for tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Uses the given cancellation token instead of an internal one.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Returns the cancellation token observed by the pool's processors.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Returns a snapshot of the pool-wide counters.
    pub async fn stats(&self) -> ProcessorStats {
        self.stats.read().await.clone()
    }

    /// Spawns the configured number of processors.
    ///
    /// Returns immediately; processors run until cancellation or until
    /// their error handler requests a stop.
    pub async fn spawn_processors(&mut self) {
        info!(processor_count = self.config.processor_count, "spawning queue processors");

        self.stats.write().await.active_processors = self.config.processor_count;

        for processor_id in 0..self.config.processor_count {
            let processor = QueueProcessor::new(
                self.transport.clone(),
                self.codec.clone(),
                self.handler.clone(),
                self.error_handler.clone(),
                self.config.clone(),
            )
            .with_id(processor_id)
            .with_stats(self.stats.clone())
            .with_cancellation(self.cancellation_token.clone())
            .with_clock(self.clock.clone());

            let processor = match (&self.dead_letter, &self.trace) {
                (Some(sink), Some(trace)) => {
                    processor.with_dead_letter(sink.clone()).with_trace_sink(trace.clone())
                },
                (Some(sink), None) => processor.with_dead_letter(sink.clone()),
                (None, Some(trace)) => processor.with_trace_sink(trace.clone()),
                (None, None) => processor,
            };

            let stats = self.stats.clone();
            let handle = tokio::spawn(async move {
                let reason = processor.run().await;
                let mut stats = stats.write().await;
                stats.active_processors = stats.active_processors.saturating_sub(1);
                reason
            });

            self.handles.push(handle);
        }
    }

    /// Returns whether any processor task is still running.
    pub fn has_active_processors(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Cancels all processors and waits for them to stop.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ShutdownTimeout`] if processors do not stop
    /// within the deadline. Processor panics are logged and surfaced as
    /// [`EngineError::ProcessorPanic`] only when every processor stopped in
    /// time, so a timeout is never masked.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            processor_count = self.handles.len(),
            timeout_secs = timeout.as_secs(),
            "initiating graceful pool shutdown"
        );

        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.handles);
        let join_all = async {
            let mut first_panic = None;
            for (processor_id, handle) in handles.into_iter().enumerate() {
                match handle.await {
                    Ok(reason) => {
                        info!(processor_id, reason = ?reason, "processor joined");
                    },
                    Err(join_error) => {
                        error!(
                            processor_id,
                            error = %join_error,
                            "processor task panicked"
                        );
                        first_panic.get_or_insert(EngineError::ProcessorPanic {
                            processor_id,
                            message: join_error.to_string(),
                        });
                    },
                }
            }
            first_panic
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(None) => {
                info!("pool shutdown completed");
                Ok(())
            },
            Ok(Some(panic)) => Err(panic),
            Err(_elapsed) => {
                error!(
                    timeout_secs = timeout.as_secs(),
                    "pool shutdown timed out, some processors may still be running"
                );
                Err(EngineError::ShutdownTimeout { timeout })
            },
        }
    }
}

impl<T> Drop for ProcessorPool<T> {
    fn drop(&mut self) {
        let active = self.handles.iter().filter(|h| !h.is_finished()).count();
        if active > 0 && !self.cancellation_token.is_cancelled() {
            self.cancellation_token.cancel();
            warn!(
                active_processors = active,
                "ProcessorPool dropped with running processors, forcing cancellation; \
                 call shutdown_graceful() for a clean stop"
            );
        }
    }
}
