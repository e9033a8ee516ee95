//! In-memory queue transport with lease semantics.
//!
//! Models the transport contract the engine relies on: delivered messages
//! become invisible for a visibility window, an undeleted message becomes
//! redeliverable with an incremented dequeue count, and a fresh receipt is
//! issued per delivery. Also implements the dead-letter sink so one instance
//! can play both roles in a test. Supports failure injection for the
//! engine's unexpected-error paths.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use conveyor_core::{Clock, CoreError, DeadLetterSink, QueueTransport, RawMessage, RealClock};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    dequeue_count: u32,
    enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct LeasedMessage {
    message: StoredMessage,
    visible_at: Instant,
}

/// In-memory queue implementing both the transport and the dead-letter
/// sink.
///
/// Redelivery is driven by the injected [`Clock`]: pair it with a
/// `TestClock` and advance past the visibility timeout, or call
/// [`expire_leases`](Self::expire_leases) to force redelivery without clock
/// arithmetic.
pub struct InMemoryQueue {
    clock: Arc<dyn Clock>,
    visibility_timeout: Duration,
    ready: Arc<RwLock<VecDeque<StoredMessage>>>,
    leased: Arc<RwLock<HashMap<String, LeasedMessage>>>,
    dead_letters: Arc<RwLock<Vec<Vec<u8>>>>,
    fail_dequeues: Arc<AtomicU32>,
    fail_deletes: Arc<AtomicU32>,
    fail_dead_letter_writes: Arc<AtomicU32>,
}

impl InMemoryQueue {
    /// Creates an empty queue with a 30 second visibility timeout and the
    /// real clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(RealClock), Duration::from_secs(30))
    }

    /// Creates an empty queue over the given clock and visibility timeout.
    pub fn with_clock(clock: Arc<dyn Clock>, visibility_timeout: Duration) -> Self {
        Self {
            clock,
            visibility_timeout,
            ready: Arc::new(RwLock::new(VecDeque::new())),
            leased: Arc::new(RwLock::new(HashMap::new())),
            dead_letters: Arc::new(RwLock::new(Vec::new())),
            fail_dequeues: Arc::new(AtomicU32::new(0)),
            fail_deletes: Arc::new(AtomicU32::new(0)),
            fail_dead_letter_writes: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Enqueues a raw payload with a zero dequeue count.
    pub async fn enqueue(&self, body: Vec<u8>) {
        self.ready.write().await.push_back(StoredMessage {
            body,
            dequeue_count: 0,
            enqueued_at: Utc::now(),
        });
    }

    /// Enqueues a message that has already been delivered `dequeue_count`
    /// times, for driving dead-letter scenarios directly.
    pub async fn enqueue_with_dequeue_count(&self, body: Vec<u8>, dequeue_count: u32) {
        self.ready.write().await.push_back(StoredMessage {
            body,
            dequeue_count,
            enqueued_at: Utc::now(),
        });
    }

    /// Forces every leased message back to the ready queue immediately,
    /// simulating visibility-timeout expiry.
    ///
    /// Lock order is ready then leased, same as `try_dequeue`.
    pub async fn expire_leases(&self) {
        let mut ready = self.ready.write().await;
        let mut leased = self.leased.write().await;
        for (_, lease) in leased.drain() {
            ready.push_back(lease.message);
        }
    }

    /// Fails the next `count` dequeue attempts with a transport error.
    pub fn inject_dequeue_errors(&self, count: u32) {
        self.fail_dequeues.store(count, Ordering::SeqCst);
    }

    /// Fails the next `count` delete attempts with a transport error.
    pub fn inject_delete_errors(&self, count: u32) {
        self.fail_deletes.store(count, Ordering::SeqCst);
    }

    /// Fails the next `count` dead-letter writes.
    pub fn inject_dead_letter_errors(&self, count: u32) {
        self.fail_dead_letter_writes.store(count, Ordering::SeqCst);
    }

    /// Number of messages currently available for delivery.
    pub async fn ready_len(&self) -> usize {
        self.ready.read().await.len()
    }

    /// Number of messages currently leased (delivered, not yet deleted).
    pub async fn leased_len(&self) -> usize {
        self.leased.read().await.len()
    }

    /// Whether both the ready queue and the lease table are empty.
    pub async fn is_drained(&self) -> bool {
        self.ready.read().await.is_empty() && self.leased.read().await.is_empty()
    }

    /// All payloads written to the dead-letter side.
    pub async fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.dead_letters.read().await.clone()
    }

    fn take_injected(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueTransport for InMemoryQueue {
    fn try_dequeue(&self) -> Pin<Box<dyn Future<Output = conveyor_core::Result<Option<RawMessage>>> + Send + '_>> {
        let ready = self.ready.clone();
        let leased = self.leased.clone();
        let fail_dequeues = self.fail_dequeues.clone();
        let clock = self.clock.clone();
        let visibility_timeout = self.visibility_timeout;

        Box::pin(async move {
            if Self::take_injected(&fail_dequeues) {
                return Err(CoreError::transport("injected dequeue failure"));
            }

            let now = clock.now();
            let mut ready = ready.write().await;
            let mut leased = leased.write().await;

            // Expired leases become redeliverable before new deliveries.
            let expired: Vec<String> = leased
                .iter()
                .filter(|(_, lease)| lease.visible_at <= now)
                .map(|(receipt, _)| receipt.clone())
                .collect();
            for receipt in expired {
                if let Some(lease) = leased.remove(&receipt) {
                    ready.push_back(lease.message);
                }
            }

            let Some(mut message) = ready.pop_front() else {
                return Ok(None);
            };
            message.dequeue_count += 1;

            // Fresh receipt per delivery, like a storage queue pop receipt.
            let receipt = Uuid::new_v4().to_string();
            let raw = RawMessage {
                receipt: receipt.clone(),
                body: message.body.clone(),
                dequeue_count: message.dequeue_count,
                enqueued_at: Some(message.enqueued_at),
            };
            leased.insert(
                receipt,
                LeasedMessage { message, visible_at: now + visibility_timeout },
            );

            Ok(Some(raw))
        })
    }

    fn delete(&self, receipt: String) -> Pin<Box<dyn Future<Output = conveyor_core::Result<()>> + Send + '_>> {
        let leased = self.leased.clone();
        let fail_deletes = self.fail_deletes.clone();

        Box::pin(async move {
            if Self::take_injected(&fail_deletes) {
                return Err(CoreError::transport("injected delete failure"));
            }

            leased
                .write()
                .await
                .remove(&receipt)
                .map(|_| ())
                .ok_or_else(|| CoreError::transport(format!("unknown or expired receipt: {receipt}")))
        })
    }
}

impl DeadLetterSink for InMemoryQueue {
    fn write(&self, payload: Vec<u8>) -> Pin<Box<dyn Future<Output = conveyor_core::Result<()>> + Send + '_>> {
        let dead_letters = self.dead_letters.clone();
        let fail_writes = self.fail_dead_letter_writes.clone();

        Box::pin(async move {
            if Self::take_injected(&fail_writes) {
                return Err(CoreError::dead_letter("injected dead-letter failure"));
            }

            dead_letters.write().await.push(payload);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use conveyor_core::TestClock;

    use super::*;

    #[tokio::test]
    async fn dequeue_count_increments_per_delivery() {
        let queue = InMemoryQueue::new();
        queue.enqueue(b"payload".to_vec()).await;

        let first = queue.try_dequeue().await.unwrap().unwrap();
        assert_eq!(first.dequeue_count, 1);

        queue.expire_leases().await;
        let second = queue.try_dequeue().await.unwrap().unwrap();
        assert_eq!(second.dequeue_count, 2);
        assert_ne!(first.receipt, second.receipt, "each delivery gets a fresh receipt");
    }

    #[tokio::test]
    async fn deleted_message_is_never_redelivered() {
        let queue = InMemoryQueue::new();
        queue.enqueue(b"payload".to_vec()).await;

        let raw = queue.try_dequeue().await.unwrap().unwrap();
        queue.delete(raw.receipt).await.unwrap();

        queue.expire_leases().await;
        assert!(queue.try_dequeue().await.unwrap().is_none());
        assert!(queue.is_drained().await);
    }

    #[tokio::test]
    async fn lease_expires_with_the_clock() {
        let clock = Arc::new(TestClock::new());
        let queue = InMemoryQueue::with_clock(clock.clone(), Duration::from_secs(30));
        queue.enqueue(b"payload".to_vec()).await;

        let _leased = queue.try_dequeue().await.unwrap().unwrap();
        assert!(queue.try_dequeue().await.unwrap().is_none());

        clock.advance(Duration::from_secs(31));
        let redelivered = queue.try_dequeue().await.unwrap().unwrap();
        assert_eq!(redelivered.dequeue_count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_polling_and_lease_expiry_make_progress() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.enqueue(b"payload".to_vec()).await;

        let poller = {
            let queue = queue.clone();
            tokio::spawn(async move {
                for _ in 0..1_000 {
                    let _ = queue.try_dequeue().await;
                }
            })
        };
        let expirer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                for _ in 0..1_000 {
                    queue.expire_leases().await;
                }
            })
        };

        tokio::time::timeout(Duration::from_secs(10), async {
            poller.await.unwrap();
            expirer.await.unwrap();
        })
        .await
        .expect("concurrent queue operations deadlocked");
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let queue = InMemoryQueue::new();
        queue.inject_dequeue_errors(1);

        let error = queue.try_dequeue().await.unwrap_err();
        assert!(matches!(error, CoreError::Transport { .. }));

        // Injection is consumed.
        assert!(queue.try_dequeue().await.unwrap().is_none());

        queue.inject_dead_letter_errors(1);
        let error = queue.write(b"x".to_vec()).await.unwrap_err();
        assert!(matches!(error, CoreError::DeadLetter { .. }));
        assert!(queue.dead_letters().await.is_empty());
    }
}
