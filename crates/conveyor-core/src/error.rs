//! Error types for queue processing contracts.
//!
//! Distinguishes the two failure channels the loop cares about: handler
//! failures (policy, feeding the retry/dead-letter decision) and
//! unexpected failures inside the loop's own plumbing (transport, codec,
//! dead-letter writes), which are routed to the caller's error hook.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Unexpected failures inside the processing loop's own plumbing.
///
/// These are the errors forwarded to the caller-supplied
/// [`ErrorHandler`](crate::ErrorHandler); handler failures are deliberately
/// not represented here because they never escalate past the loop.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Queue transport operation failed (dequeue or delete).
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure
        message: String,
    },

    /// Payload could not be decoded from its wire representation.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the decode failure
        message: String,
    },

    /// Payload could not be encoded to its wire representation.
    #[error("encode error: {message}")]
    Encode {
        /// Description of the encode failure
        message: String,
    },

    /// Write to the dead-letter destination failed.
    #[error("dead-letter write failed: {message}")]
    DeadLetter {
        /// Description of the dead-letter failure
        message: String,
    },
}

impl CoreError {
    /// Creates a transport error from a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Creates a decode error from a message.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into() }
    }

    /// Creates an encode error from a message.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode { message: message.into() }
    }

    /// Creates a dead-letter error from a message.
    pub fn dead_letter(message: impl Into<String>) -> Self {
        Self::DeadLetter { message: message.into() }
    }

    /// Returns whether this error originated in the payload codec.
    ///
    /// Codec errors point at malformed content rather than infrastructure;
    /// retrying them without intervention cannot succeed.
    pub const fn is_codec(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Encode { .. })
    }
}

/// Failure reported by a caller-supplied item handler.
///
/// Opaque to the loop: the only decision it drives is retry versus
/// dead-letter, based on the item's dequeue count.
#[derive(Debug, Clone, Error)]
#[error("handler failed: {message}")]
pub struct HandlerError {
    /// Description of the handler failure
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
