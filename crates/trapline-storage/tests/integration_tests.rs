//! Integration tests for the object store
//!
//! These tests require a running MinIO (or other S3-compatible) instance:
//!
//! ```bash
//! docker run --rm -p 9000:9000 -e MINIO_ROOT_USER=minioadmin \
//!     -e MINIO_ROOT_PASSWORD=minioadmin minio/minio server /data
//! cargo test --package trapline-storage --test integration_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use trapline_storage::{buckets, ObjectStore};
use uuid::Uuid;

fn store() -> ObjectStore {
    let endpoint =
        std::env::var("S3_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".to_string());
    let access_key = std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string());
    let secret_key = std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string());
    ObjectStore::connect(&endpoint, &access_key, &secret_key)
}

#[tokio::test]
#[ignore = "requires running MinIO (run with --ignored)"]
async fn test_put_get_delete_round_trip() {
    let store = store();
    store.ensure_buckets().await.expect("Failed to ensure buckets");

    let key = format!("test/{}.jpg", Uuid::new_v4());
    let payload = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00];

    store
        .put_bytes(buckets::RAW_IMAGES, &key, payload.clone())
        .await
        .expect("Failed to upload");

    let fetched = store
        .get_bytes(buckets::RAW_IMAGES, &key)
        .await
        .expect("Failed to download");
    assert_eq!(fetched, payload);

    store
        .delete(buckets::RAW_IMAGES, &key)
        .await
        .expect("Failed to delete");

    let missing = store.get_bytes(buckets::RAW_IMAGES, &key).await;
    assert!(matches!(missing, Err(trapline_storage::Error::NotFound { .. })));
}

#[tokio::test]
#[ignore = "requires running MinIO (run with --ignored)"]
async fn test_delete_is_idempotent() {
    let store = store();
    store.ensure_buckets().await.expect("Failed to ensure buckets");

    let key = format!("test/{}.jpg", Uuid::new_v4());
    store
        .delete(buckets::THUMBNAILS, &key)
        .await
        .expect("Deleting a missing object must succeed");
}

#[tokio::test]
#[ignore = "requires running MinIO (run with --ignored)"]
async fn test_list_by_prefix() {
    let store = store();
    store.ensure_buckets().await.expect("Failed to ensure buckets");

    let prefix = format!("prefix-{}", Uuid::new_v4());
    for i in 0..3 {
        store
            .put_bytes(buckets::CROPS, &format!("{prefix}/{i}.jpg"), vec![i])
            .await
            .expect("Failed to upload");
    }

    let keys = store
        .list(buckets::CROPS, Some(&prefix))
        .await
        .expect("Failed to list");
    assert_eq!(keys.len(), 3);
    assert!(keys.iter().all(|k| k.starts_with(&prefix)));
}
