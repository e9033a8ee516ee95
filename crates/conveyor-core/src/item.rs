//! Decoded queue item with delivery metadata.

use chrono::{DateTime, Utc};

/// A decoded payload together with its delivery metadata.
///
/// Owned transiently by one loop iteration and never persisted by the
/// engine. The `receipt` travels with the item so the iteration that owns it
/// can delete or dead-letter the underlying message.
#[derive(Debug, Clone)]
pub struct QueueItem<T> {
    /// The decoded business payload.
    pub payload: T,

    /// Opaque transport handle for the underlying message.
    pub receipt: String,

    /// Number of times the underlying message has been delivered, this
    /// delivery included.
    pub dequeue_count: u32,

    /// When the underlying message was first enqueued, if known.
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl<T> QueueItem<T> {
    /// Returns whether this delivery has exceeded the given dequeue ceiling.
    ///
    /// The ceiling counts full deliveries: an item becomes eligible for
    /// dead-lettering on delivery `max_dequeue_count + 1`.
    pub fn exceeded_dequeue_count(&self, max_dequeue_count: u32) -> bool {
        self.dequeue_count > max_dequeue_count
    }
}
