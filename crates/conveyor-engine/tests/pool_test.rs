//! Integration tests for the processor pool lifecycle.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Result;
use conveyor_core::{JsonCodec, TestClock};
use conveyor_engine::{BackoffPolicy, ProcessorConfig, ProcessorPool};
use conveyor_testing::{InMemoryQueue, RecordingErrorHandler, RecordingHandler};
use serde_json::{json, Value};

fn pool_config(processor_count: usize) -> ProcessorConfig {
    ProcessorConfig {
        processor_count,
        backoff: BackoffPolicy { jitter_factor: 0.0, ..Default::default() },
        ..Default::default()
    }
}

fn pool_with(
    queue: &Arc<InMemoryQueue>,
    handler: Arc<RecordingHandler<Value>>,
    error_handler: Arc<RecordingErrorHandler>,
    config: ProcessorConfig,
) -> ProcessorPool<Value> {
    ProcessorPool::new(
        queue.clone(),
        Arc::new(JsonCodec::<Value>::new()),
        handler,
        error_handler,
        config,
    )
    .with_clock(Arc::new(TestClock::new()))
}

/// Polls a condition until it holds, bounded by a wall-clock deadline.
async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if condition().await {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not met within deadline");
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_spawns_configured_count_and_shuts_down() -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    let mut pool = pool_with(
        &queue,
        Arc::new(RecordingHandler::new()),
        Arc::new(RecordingErrorHandler::continuing()),
        pool_config(3),
    );

    pool.spawn_processors().await;

    assert!(pool.has_active_processors());
    assert_eq!(pool.stats().await.active_processors, 3);

    pool.shutdown_graceful(Duration::from_secs(5)).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_drains_the_queue_across_processors() -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    for sequence in 0..10 {
        queue.enqueue(serde_json::to_vec(&json!({"sequence": sequence}))?).await;
    }

    let handler = Arc::new(RecordingHandler::<Value>::new());
    let mut pool = pool_with(
        &queue,
        handler.clone(),
        Arc::new(RecordingErrorHandler::continuing()),
        pool_config(2),
    );

    pool.spawn_processors().await;
    let pool_ref = &pool;
    eventually(move || async move { pool_ref.stats().await.items_handled == 10 }).await;

    assert!(queue.is_drained().await);
    assert_eq!(handler.seen().len(), 10);

    pool.shutdown_graceful(Duration::from_secs(5)).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn processor_stopped_by_error_handler_leaves_the_pool() -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    queue.inject_dequeue_errors(1);

    let error_handler = Arc::new(RecordingErrorHandler::stopping());
    let mut pool = pool_with(
        &queue,
        Arc::new(RecordingHandler::new()),
        error_handler.clone(),
        pool_config(1),
    );

    pool.spawn_processors().await;
    let pool_ref = &pool;
    eventually(move || async move { !pool_ref.has_active_processors() }).await;

    assert_eq!(pool.stats().await.active_processors, 0);
    assert_eq!(error_handler.errors().len(), 1);

    pool.shutdown_graceful(Duration::from_secs(5)).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_a_live_pool_cancels_its_processors() -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    let mut pool = pool_with(
        &queue,
        Arc::new(RecordingHandler::new()),
        Arc::new(RecordingErrorHandler::continuing()),
        pool_config(2),
    );

    pool.spawn_processors().await;
    let token = pool.cancellation_token();
    assert!(!token.is_cancelled());

    drop(pool);

    assert!(token.is_cancelled(), "drop must force-cancel running processors");
    Ok(())
}
