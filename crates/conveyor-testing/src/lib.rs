//! Test tooling for the conveyor queue processing loop.
//!
//! Provides an in-memory queue transport with lease/visibility semantics,
//! scripted handlers, and recording hooks so engine behavior can be tested
//! deterministically without a real queue service.

pub mod handlers;
pub mod queue;

pub use handlers::{
    AlwaysFailHandler, RecordingErrorHandler, RecordingHandler, RecordingTraceSink,
    ScriptedHandler,
};
pub use queue::InMemoryQueue;

/// Initializes tracing output for tests.
///
/// Respects `RUST_LOG`; safe to call from multiple tests.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
