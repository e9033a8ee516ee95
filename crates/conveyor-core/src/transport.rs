//! Queue transport abstraction for the processing loop.
//!
//! Provides trait-based abstractions over the message queue so the engine can
//! be tested without a real queue service and deployed against any transport
//! with lease/visibility-timeout semantics. Production implementations wrap a
//! storage SDK; tests use the in-memory queue from `conveyor-testing`.

use std::{future::Future, pin::Pin};

use chrono::{DateTime, Utc};

use crate::error::Result;

/// A message as delivered by the transport, before decoding.
///
/// The `receipt` is an opaque transport-specific handle; the engine only ever
/// passes it back to [`QueueTransport::delete`]. `dequeue_count` must be
/// incremented by the transport each time the message becomes visible again
/// without having been deleted.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Opaque handle used to delete the message after processing.
    pub receipt: String,

    /// Wire representation of the payload.
    pub body: Vec<u8>,

    /// Number of times this message has been delivered, this delivery
    /// included. Monotonically non-decreasing across redeliveries.
    pub dequeue_count: u32,

    /// When the message was first enqueued, if the transport records it.
    pub enqueued_at: Option<DateTime<Utc>>,
}

/// Queue operations required by the processing loop.
///
/// The transport is the only resource shared between concurrent processors
/// and must provide its own concurrency-safe dequeue semantics: two
/// processors must never observe the same undelivered message as available
/// simultaneously. A message not deleted before its visibility window
/// elapses must become eligible for redelivery with an incremented dequeue
/// count. The engine relies on, but does not enforce, this contract.
pub trait QueueTransport: Send + Sync + 'static {
    /// Attempts to dequeue the next message without blocking indefinitely.
    ///
    /// Returns `Ok(None)` when no message is currently available. May use a
    /// short internal poll so cancellation is still observed promptly.
    fn try_dequeue(&self) -> Pin<Box<dyn Future<Output = Result<Option<RawMessage>>> + Send + '_>>;

    /// Deletes a delivered message so it is never redelivered.
    ///
    /// Called after successful handling and after a successful dead-letter
    /// write.
    fn delete(&self, receipt: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Destination for items that exceeded the retry ceiling.
///
/// An independent queue or log preserved for manual inspection; no
/// redelivery semantics are required of it. The engine writes each item at
/// most once.
pub trait DeadLetterSink: Send + Sync + 'static {
    /// Writes one serialized payload to the dead-letter destination.
    fn write(&self, payload: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
