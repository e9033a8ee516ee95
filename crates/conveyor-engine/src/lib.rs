//! Backoff-driven queue processing loop.
//!
//! This crate implements the stateful core of the system: a loop that pulls
//! items from a [`QueueTransport`](conveyor_core::QueueTransport), hands each
//! to a caller-supplied handler, and manages retry, backoff, and dead-letter
//! policy around failures. The loop knows nothing about the queue transport's
//! implementation or the payload's business meaning.
//!
//! # Architecture
//!
//! Each [`QueueProcessor`] runs one logical loop:
//!
//! 1. **Poll** - attempt to dequeue the next message
//! 2. **Decode** - unmarshal the payload via the codec
//! 3. **Handle** - await the caller-supplied handler
//! 4. **Settle** - delete on success; on failure consult the dequeue count
//!    and either leave the message for redelivery or dead-letter it
//!
//! Every iteration that made no progress advances a backoff counter and
//! waits before the next poll; successful handling resets it and polls again
//! immediately. Unexpected failures inside the loop (transport, decode) go
//! to the caller's [`ErrorHandler`](conveyor_core::ErrorHandler), which
//! decides whether the loop survives. [`ProcessorPool`] runs several
//! processors over one transport for throughput.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use conveyor_core::{ContinueOnError, JsonCodec};
//! use conveyor_engine::{ProcessorConfig, QueueProcessor};
//! # use conveyor_core::{QueueTransport, ItemHandler};
//!
//! # async fn example(
//! #     transport: Arc<dyn QueueTransport>,
//! #     handler: Arc<dyn ItemHandler<serde_json::Value>>,
//! # ) {
//! let processor = QueueProcessor::new(
//!     transport,
//!     Arc::new(JsonCodec::<serde_json::Value>::new()),
//!     handler,
//!     Arc::new(ContinueOnError),
//!     ProcessorConfig::default(),
//! );
//!
//! // Runs until cancelled or the error handler requests a stop.
//! let reason = processor.run().await;
//! # let _ = reason;
//! # }
//! ```

pub mod backoff;
pub mod error;
pub mod pool;
pub mod processor;

pub use backoff::{BackoffPolicy, BackoffState, BackoffStrategy};
pub use error::{EngineError, Result};
pub use pool::ProcessorPool;
pub use processor::{Outcome, ProcessorConfig, ProcessorStats, QueueProcessor, StopReason};

/// Default dequeue-count ceiling before an item is eligible for
/// dead-lettering.
pub const DEFAULT_MAX_DEQUEUE_COUNT: u32 = 10;

/// Default number of concurrent processors spawned by a pool.
pub const DEFAULT_PROCESSOR_COUNT: usize = 1;
