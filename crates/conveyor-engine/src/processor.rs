//! The queue processing loop.
//!
//! Owns the poll/handle/backoff/dead-letter state machine. One processor
//! runs one logical loop, suspending only while awaiting the transport and
//! the handler; several processors may share a transport, each with its own
//! backoff state. All retry/dead-letter branching is expressed through the
//! exhaustive [`Outcome`] table rather than error-driven control flow.

use std::{sync::Arc, time::Duration};

use conveyor_core::{
    Clock, CoreError, DeadLetterSink, ErrorHandler, HandlerError, ItemCodec, ItemHandler,
    QueueItem, QueueTransport, RealClock, TraceSink,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    backoff::{BackoffPolicy, BackoffState},
    DEFAULT_MAX_DEQUEUE_COUNT, DEFAULT_PROCESSOR_COUNT,
};

/// Configuration fixed at processor start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Dequeue-count ceiling: an item whose count exceeds this becomes
    /// eligible for dead-lettering on its next failure.
    pub max_dequeue_count: u32,

    /// Backoff curve applied after unproductive iterations.
    pub backoff: BackoffPolicy,

    /// When the ceiling is exceeded and no dead-letter sink is configured,
    /// delete the message instead of leaving it for redelivery. Off by
    /// default: without it the transport's own limits bound the message's
    /// lifetime.
    pub drop_on_exhaustion: bool,

    /// Number of processors a pool spawns.
    pub processor_count: usize,

    /// Maximum time a pool waits for processors to finish during graceful
    /// shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_dequeue_count: DEFAULT_MAX_DEQUEUE_COUNT,
            backoff: BackoffPolicy::default(),
            drop_on_exhaustion: false,
            processor_count: DEFAULT_PROCESSOR_COUNT,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one loop iteration.
///
/// Drives both the backoff decision (only `ItemHandled` resets the counter)
/// and observability. The table is exhaustive: every way an iteration can
/// end is named here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handler succeeded; the message was deleted from the source queue.
    ItemHandled,
    /// Handler failed; the message stays on the queue for redelivery.
    ItemFailedRetryable,
    /// Handler failed past the ceiling; the payload was written to the
    /// dead-letter sink and the message deleted from the source queue.
    ItemFailedDeadLettered,
    /// Handler failed past the ceiling with no sink configured and
    /// `drop_on_exhaustion` set; the message was deleted.
    ItemFailedDropped,
    /// No message was available.
    QueueEmpty,
    /// An unexpected error occurred and the error handler chose to
    /// continue.
    UnexpectedError,
}

/// Why a processor's run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation token was signalled.
    Cancelled,
    /// The error handler returned `false` for an unexpected error.
    ErrorHandlerRequested,
}

/// Counters for processor monitoring.
///
/// Shared between processors of one pool; observability only.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    /// Number of currently running processors.
    pub active_processors: usize,
    /// Items handled successfully.
    pub items_handled: u64,
    /// Failed items left on the queue for redelivery.
    pub items_retried: u64,
    /// Items written to the dead-letter sink.
    pub items_dead_lettered: u64,
    /// Items deleted after exhausting deliveries without a sink.
    pub items_dropped: u64,
    /// Polls that found the queue empty.
    pub empty_polls: u64,
    /// Unexpected errors surfaced to the error handler.
    pub unexpected_errors: u64,
}

/// A single-use backoff-driven queue processor.
///
/// `run` consumes the processor, so a stopped instance cannot be restarted;
/// construct a new one instead. Optional collaborators (dead-letter sink,
/// trace sink, clock, cancellation token, shared stats) are attached with
/// the `with_*` methods before `run`.
pub struct QueueProcessor<T> {
    id: usize,
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
    backoff: BackoffState,
}

impl<T> QueueProcessor<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a processor over the given transport, codec, handler, and
    /// error policy.
    ///
    /// The error handler decides whether the loop survives unexpected
    /// failures; it is required rather than defaulted so the choice is
    /// always explicit.
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        codec: Arc<dyn ItemCodec<T>>,
        handler: Arc<dyn ItemHandler<T>>,
        error_handler: Arc<dyn ErrorHandler>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            id: 0,
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
            backoff: BackoffState::new(),
        }
    }

    /// Attaches a dead-letter destination for items that exhaust their
    /// deliveries.
    #[must_use]
    pub fn with_dead_letter(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    /// Attaches a best-effort trace sink receiving one line per notable
    /// transition.
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

    /// Shares a stats instance, typically across a pool.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<RwLock<ProcessorStats>>) -> Self {
        self.stats = stats;
        self
    }

    pub(crate) fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// Returns the cancellation token observed by this processor.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Returns a snapshot of the processor's counters.
    pub async fn stats(&self) -> ProcessorStats {
        self.stats.read().await.clone()
    }

    /// Runs the loop until cancellation or until the error handler requests
    /// a stop.
    ///
    /// Cancellation is observed at the top of every iteration and during
    /// backoff waits; it never interrupts an in-flight dead-letter write or
    /// delete. The returned [`StopReason`] makes the exit cause explicit --
    /// the loop never exits on a transient failure.
    pub async fn run(mut self) -> StopReason {
        info!(
            processor_id = self.id,
            max_dequeue_count = self.config.max_dequeue_count,
            dead_letter = self.dead_letter.is_some(),
            "queue processor starting"
        );

        let reason = loop {
            if self.cancellation_token.is_cancelled() {
                break StopReason::Cancelled;
            }

            let outcome = match self.process_once().await {
                Ok(outcome) => outcome,
                Err(cause) => {
                    error!(
                        processor_id = self.id,
                        error = %cause,
                        "unexpected error in processing loop"
                    );
                    self.trace_line(&format!("unexpected error: {cause}"));
                    self.stats.write().await.unexpected_errors += 1;

                    if self.error_handler.on_error(cause).await {
                        Outcome::UnexpectedError
                    } else {
                        break StopReason::ErrorHandlerRequested;
                    }
                },
            };

            if outcome == Outcome::ItemHandled {
                // Queue is busy and we are making progress: poll again
                // immediately.
                self.backoff.reset();
                continue;
            }

            let delay = self.backoff.next(&self.config.backoff);
            debug!(
                processor_id = self.id,
                outcome = ?outcome,
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "backing off before next poll"
            );

            tokio::select! {
                () = self.clock.sleep(delay) => {},
                () = self.cancellation_token.cancelled() => break StopReason::Cancelled,
            }
        };

        info!(processor_id = self.id, reason = ?reason, "queue processor stopped");
        self.trace_line(&format!("processor stopped: {reason:?}"));
        reason
    }

    /// Executes exactly one iteration: poll, decode, handle, settle.
    ///
    /// Does not sleep, consult the error handler, or touch backoff state;
    /// `run` layers those on top. Exposed so tests and controlled batch
    /// callers can step the machine deterministically.
    ///
    /// # Errors
    ///
    /// Returns the unexpected-failure channel: transport errors, decode
    /// failures, and delete failures. Handler failures are not errors; they
    /// settle into an [`Outcome`].
    pub async fn process_once(&self) -> Result<Outcome, CoreError> {
        let Some(raw) = self.transport.try_dequeue().await? else {
            debug!(processor_id = self.id, "queue empty");
            self.trace_line("queue empty");
            self.stats.write().await.empty_polls += 1;
            return Ok(Outcome::QueueEmpty);
        };

        // Decode failure is malformed content, not a handler failure: it
        // goes to the error handler instead of burning redeliveries.
        let payload = self.codec.deserialize(&raw.body)?;
        let item = QueueItem {
            payload,
            receipt: raw.receipt,
            dequeue_count: raw.dequeue_count,
            enqueued_at: raw.enqueued_at,
        };

        match self.handler.handle(&item).await {
            Ok(()) => {
                self.transport.delete(item.receipt.clone()).await?;
                self.stats.write().await.items_handled += 1;
                info!(
                    processor_id = self.id,
                    dequeue_count = item.dequeue_count,
                    "item handled"
                );
                self.trace_line("item handled");
                Ok(Outcome::ItemHandled)
            },
            Err(cause) => self.settle_failed_item(item, &cause).await,
        }
    }

    /// Dead-letter evaluation for a failed item.
    ///
    /// The one nested failure path -- the dead-letter write itself failing
    /// (re-serialization included) -- is not retried here; it settles as
    /// retryable so the transport's redelivery retries the whole sequence,
    /// bounded by the same dequeue-count ceiling.
    async fn settle_failed_item(
        &self,
        item: QueueItem<T>,
        cause: &HandlerError,
    ) -> Result<Outcome, CoreError> {
        warn!(
            processor_id = self.id,
            dequeue_count = item.dequeue_count,
            error = %cause,
            "handler failed"
        );

        if !item.exceeded_dequeue_count(self.config.max_dequeue_count) {
            self.stats.write().await.items_retried += 1;
            self.trace_line("item failed, left for redelivery");
            return Ok(Outcome::ItemFailedRetryable);
        }

        if let Some(sink) = &self.dead_letter {
            let written = match self.codec.serialize(&item.payload) {
                Ok(bytes) => sink.write(bytes).await,
                Err(encode_error) => Err(encode_error),
            };

            return match written {
                Ok(()) => {
                    self.transport.delete(item.receipt.clone()).await?;
                    self.stats.write().await.items_dead_lettered += 1;
                    warn!(
                        processor_id = self.id,
                        dequeue_count = item.dequeue_count,
                        "item dead-lettered"
                    );
                    self.trace_line("item dead-lettered");
                    Ok(Outcome::ItemFailedDeadLettered)
                },
                Err(write_error) => {
                    warn!(
                        processor_id = self.id,
                        error = %write_error,
                        "dead-letter write failed, leaving item for redelivery"
                    );
                    self.stats.write().await.items_retried += 1;
                    self.trace_line("dead-letter write failed, item left for redelivery");
                    Ok(Outcome::ItemFailedRetryable)
                },
            };
        }

        if self.config.drop_on_exhaustion {
            self.transport.delete(item.receipt.clone()).await?;
            self.stats.write().await.items_dropped += 1;
            warn!(
                processor_id = self.id,
                dequeue_count = item.dequeue_count,
                "item dropped after exhausting deliveries"
            );
            self.trace_line("item dropped");
            return Ok(Outcome::ItemFailedDropped);
        }

        self.stats.write().await.items_retried += 1;
        self.trace_line("item failed past ceiling, no dead-letter sink, left for redelivery");
        Ok(Outcome::ItemFailedRetryable)
    }

    fn trace_line(&self, line: &str) {
        if let Some(sink) = &self.trace {
            sink.trace(line);
        }
    }
}
