//! Contracts and leaf types for the conveyor queue processing loop.
//!
//! Defines the narrow interfaces the processing engine depends on: the queue
//! transport, the payload codec, the item handler, and the error/trace hooks.
//! The engine crate owns the loop itself; everything here is policy-free and
//! does no I/O of its own apart from the transport implementations callers
//! supply.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod handler;
pub mod item;
pub mod time;
pub mod transport;

pub use codec::{ItemCodec, JsonCodec};
pub use error::{CoreError, HandlerError, Result};
pub use handler::{ContinueOnError, ErrorHandler, ItemHandler, NoOpTraceSink, StopOnError, TraceSink};
pub use item::QueueItem;
pub use time::{Clock, RealClock, TestClock};
pub use transport::{DeadLetterSink, QueueTransport, RawMessage};
