//! Integration tests for the Redis queue bus
//!
//! These tests require a running Redis instance:
//!
//! ```bash
//! docker run --rm -p 6379:6379 redis:7
//! cargo test --package trapline-queue --test integration_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use trapline_core::messages::ImageIngested;
use trapline_queue::{names, JobQueue};
use uuid::Uuid;

/// Get Redis connection string from environment or use default
fn get_connection_string() -> String {
    std::env::var("REDIS_CONNECTION_STRING").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn test_queue_name(suffix: &str) -> String {
    format!("trapline-test-{}-{}", suffix, Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires running Redis (run with --ignored)"]
async fn test_publish_consume_round_trip() {
    let queue = JobQueue::connect(&get_connection_string(), &test_queue_name("roundtrip"))
        .await
        .expect("Failed to connect to Redis");

    let message = ImageIngested {
        image_uuid: Uuid::new_v4(),
        storage_path: "cam/2025/12/img.jpg".to_string(),
        camera_id: 1,
    };
    queue.publish(&message).await.expect("Failed to publish");

    let received: Option<ImageIngested> = queue.consume(2.0).await.expect("Failed to consume");
    assert_eq!(received, Some(message));
}

#[tokio::test]
#[ignore = "requires running Redis (run with --ignored)"]
async fn test_fifo_order_preserved() {
    let queue = JobQueue::connect(&get_connection_string(), &test_queue_name("fifo"))
        .await
        .expect("Failed to connect to Redis");

    let messages: Vec<ImageIngested> = (0..5)
        .map(|i| ImageIngested {
            image_uuid: Uuid::new_v4(),
            storage_path: format!("cam/2025/12/img-{i}.jpg"),
            camera_id: i,
        })
        .collect();

    for message in &messages {
        queue.publish(message).await.expect("Failed to publish");
    }

    for expected in &messages {
        let received: Option<ImageIngested> = queue.consume(2.0).await.expect("Failed to consume");
        assert_eq!(received.as_ref(), Some(expected));
    }
}

#[tokio::test]
#[ignore = "requires running Redis (run with --ignored)"]
async fn test_consume_timeout_on_empty_queue() {
    let queue = JobQueue::connect(&get_connection_string(), &test_queue_name("empty"))
        .await
        .expect("Failed to connect to Redis");

    let received: Option<ImageIngested> = queue.consume(1.0).await.expect("Failed to consume");
    assert!(received.is_none());
}

#[tokio::test]
#[ignore = "requires running Redis (run with --ignored)"]
async fn test_depth_tracks_queue_length() {
    let queue = JobQueue::connect(&get_connection_string(), &test_queue_name("depth"))
        .await
        .expect("Failed to connect to Redis");

    assert_eq!(queue.depth().await.expect("Failed to read depth"), 0);

    let message = ImageIngested {
        image_uuid: Uuid::new_v4(),
        storage_path: "cam/2025/12/img.jpg".to_string(),
        camera_id: 1,
    };
    queue.publish(&message).await.expect("Failed to publish");
    queue.publish(&message).await.expect("Failed to publish");
    assert_eq!(queue.depth().await.expect("Failed to read depth"), 2);

    let _: Option<ImageIngested> = queue.consume(2.0).await.expect("Failed to consume");
    assert_eq!(queue.depth().await.expect("Failed to read depth"), 1);
}

#[tokio::test]
#[ignore = "requires running Redis (run with --ignored)"]
async fn test_dead_letter_carries_source_and_error() {
    let source_name = test_queue_name("dlq-source");
    let queue = JobQueue::connect(&get_connection_string(), &source_name)
        .await
        .expect("Failed to connect to Redis");

    let payload = serde_json::json!({"image_uuid": "broken"});
    queue
        .publish_dead_letter(&source_name, payload.clone(), "decode failure")
        .await
        .expect("Failed to dead-letter");

    let dlq = queue.with_queue(names::FAILED_JOBS);
    let entry: Option<trapline_core::messages::DeadLetter> =
        dlq.consume(2.0).await.expect("Failed to consume dead letter");
    let entry = entry.expect("dead letter missing");
    assert_eq!(entry.queue, source_name);
    assert_eq!(entry.payload, payload);
    assert_eq!(entry.error, "decode failure");
}
