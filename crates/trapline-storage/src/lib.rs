//! S3/MinIO object store for imagery and project assets
//!
//! Content-addressed blob storage behind the pipeline: raw images,
//! thumbnails, annotated images, detection crops, and project assets each
//! live in their own bucket. Camera blobs follow the path convention
//! `{camera_identifier}/{YYYY}/{MM}/{image_uuid}_{filename}` - the UUID
//! prefix prevents filename collisions across cameras that reuse counters.
//!
//! Deletions are idempotent; there is no versioning.
//!
//! # Example
//!
//! ```rust,ignore
//! use trapline_storage::{buckets, ObjectStore};
//!
//! async fn example(store: &ObjectStore) -> Result<(), trapline_storage::Error> {
//!     let bytes = store.get_bytes(buckets::RAW_IMAGES, "cam/2025/12/abc_img.jpg").await?;
//!     store.put_bytes(buckets::THUMBNAILS, "annotated/abc.jpg", bytes).await?;
//!     Ok(())
//! }
//! ```

pub mod buckets {
    //! Bucket names. Annotated images live under `annotated/` in `THUMBNAILS`.

    /// Full-resolution uploads
    pub const RAW_IMAGES: &str = "raw-images";
    /// 300 px thumbnails plus the `annotated/` prefix
    pub const THUMBNAILS: &str = "thumbnails";
    /// Per-detection crops
    pub const CROPS: &str = "crops";
    /// Project cover images
    pub const PROJECT_IMAGES: &str = "project-images";
    /// Project document uploads
    pub const PROJECT_DOCUMENTS: &str = "project-documents";

    /// All buckets, for startup provisioning
    pub const ALL: &[&str] = &[
        RAW_IMAGES,
        THUMBNAILS,
        CROPS,
        PROJECT_IMAGES,
        PROJECT_DOCUMENTS,
    ];
}

use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Datelike, Utc};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors raised by the object store
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Underlying S3 operation failed
    #[error("object store error: {0}")]
    S3(String),

    /// Local filesystem I/O while staging a blob
    #[error("object store io error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested object does not exist
    #[error("object not found: {bucket}/{key}")]
    NotFound {
        /// Bucket queried
        bucket: String,
        /// Key queried
        key: String,
    },
}

/// Result type for object store operations
pub type Result<T> = std::result::Result<T, Error>;

/// MinIO/S3 client wrapper
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
}

impl ObjectStore {
    /// Connect to a MinIO/S3 endpoint with static credentials and path-style
    /// addressing (MinIO's default)
    pub fn connect(endpoint: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "trapline");
        let config = S3ConfigBuilder::new()
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .region(Region::new("us-east-1"))
            .force_path_style(true)
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .build();
        info!(endpoint, "object store client initialized");
        Self {
            client: Client::from_conf(config),
        }
    }

    /// Build from an existing client (tests, custom configuration)
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Create every bucket in [`buckets::ALL`] that does not exist yet.
    ///
    /// # Errors
    /// Returns an error if a bucket can neither be found nor created.
    pub async fn ensure_buckets(&self) -> Result<()> {
        for bucket in buckets::ALL {
            if self.client.head_bucket().bucket(*bucket).send().await.is_ok() {
                continue;
            }
            self.client
                .create_bucket()
                .bucket(*bucket)
                .send()
                .await
                .map_err(|e| Error::S3(e.to_string()))?;
            info!(bucket, "created bucket");
        }
        Ok(())
    }

    /// Upload raw bytes.
    ///
    /// # Errors
    /// Returns an error if the upload fails.
    pub async fn put_bytes(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| Error::S3(e.to_string()))?;
        debug!(bucket, key, size_bytes = size, "object uploaded");
        Ok(())
    }

    /// Upload a local file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the upload fails.
    pub async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| Error::S3(e.to_string()))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::S3(e.to_string()))?;
        debug!(bucket, key, "file uploaded");
        Ok(())
    }

    /// Download an object into memory.
    ///
    /// # Errors
    /// Returns `Error::NotFound` for a missing key, `Error::S3` otherwise.
    pub async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(e.to_string(), bucket, key))?;
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::S3(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    /// Download an object to a local file (detection and classification
    /// workers stage blobs in per-message temp files).
    ///
    /// # Errors
    /// Returns `Error::NotFound` for a missing key, I/O errors for the write.
    pub async fn download_to_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let bytes = self.get_bytes(bucket, key).await?;
        tokio::fs::write(path, bytes).await?;
        debug!(bucket, key, path = %path.display(), "object downloaded");
        Ok(())
    }

    /// Delete an object. Deleting a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error only on transport or permission failure.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        match self
            .client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => {
                debug!(bucket, key, "object deleted");
                Ok(())
            }
            Err(e) if e.to_string().contains("NoSuchKey") => {
                warn!(bucket, key, "delete of missing object ignored");
                Ok(())
            }
            Err(e) => Err(Error::S3(e.to_string())),
        }
    }

    /// List object keys under a prefix.
    ///
    /// # Errors
    /// Returns an error on transport failure.
    pub async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut request = self.client.list_objects_v2().bucket(bucket);
        if let Some(prefix) = prefix {
            request = request.prefix(prefix);
        }
        let response = request.send().await.map_err(|e| Error::S3(e.to_string()))?;
        Ok(response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect())
    }
}

fn classify_get_error(message: String, bucket: &str, key: &str) -> Error {
    if message.contains("NoSuchKey") {
        Error::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        Error::S3(message)
    }
}

/// Object key for a camera blob:
/// `{camera_identifier}/{YYYY}/{MM}/{image_uuid}_{filename}`.
///
/// Used for both the raw image and its thumbnail so the two buckets stay
/// path-symmetric.
pub fn camera_object_path(
    camera_identifier: &str,
    uploaded_at: DateTime<Utc>,
    image_uuid: Uuid,
    filename: &str,
) -> String {
    format!(
        "{}/{}/{:02}/{}_{}",
        camera_identifier,
        uploaded_at.year(),
        uploaded_at.month(),
        image_uuid,
        filename
    )
}

/// Object key for an annotated image inside the thumbnails bucket
pub fn annotated_object_path(image_uuid: Uuid) -> String {
    format!("annotated/{image_uuid}.jpg")
}

/// Object key for one detection crop
pub fn crop_object_path(image_uuid: Uuid, detection_index: usize) -> String {
    format!("{image_uuid}_{detection_index}.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_camera_object_path_convention() {
        let uploaded_at = Utc.with_ymd_and_hms(2025, 12, 5, 15, 46, 7).unwrap();
        let uuid = Uuid::nil();
        let path = camera_object_path("861943070068027", uploaded_at, uuid, "E1000159.JPG");
        assert_eq!(
            path,
            "861943070068027/2025/12/00000000-0000-0000-0000-000000000000_E1000159.JPG"
        );
    }

    #[test]
    fn test_camera_object_path_zero_pads_month() {
        let uploaded_at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let path = camera_object_path("WUH09", uploaded_at, Uuid::nil(), "a.jpg");
        assert!(path.contains("/2026/03/"));
    }

    #[test]
    fn test_annotated_path_prefix() {
        let path = annotated_object_path(Uuid::nil());
        assert_eq!(path, "annotated/00000000-0000-0000-0000-000000000000.jpg");
    }

    #[test]
    fn test_not_found_error_display() {
        let err = Error::NotFound {
            bucket: "raw-images".to_string(),
            key: "missing.jpg".to_string(),
        };
        assert_eq!(format!("{err}"), "object not found: raw-images/missing.jpg");
    }

    #[test]
    fn test_all_buckets_listed_once() {
        let mut names: Vec<&str> = buckets::ALL.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), buckets::ALL.len());
    }
}
