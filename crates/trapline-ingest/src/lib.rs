//! FTPS drop-directory ingestion worker
//!
//! Watches the upload directory for `.jpg`/`.jpeg` images and `.txt` daily
//! reports delivered over FTPS, validates and parses them, uploads blobs,
//! writes image rows, and publishes `image-ingested` messages.
//!
//! Failure policy: anything wrong with the *file* (bad magic bytes,
//! oversized, unsupported camera, duplicate, unparseable report) moves it to
//! `rejected/<reason>/` with a JSON sidecar and is done - no retry, no crash.
//! Anything wrong with the *infrastructure* (database, object store, broker)
//! leaves the file in place so the next filesystem event retries it.

pub mod error;
pub mod exif_data;
pub mod pipeline;
pub mod profiles;
pub mod reject;
pub mod report;
pub mod thumbnail;
pub mod validate;
pub mod watcher;

pub use error::{IngestError, Rejection};
pub use pipeline::Ingestor;

/// Maximum accepted image size
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
/// Maximum accepted daily-report size
pub const MAX_REPORT_BYTES: u64 = 1024 * 1024;
/// Settle time after a create event before the file is read, so partially
/// transferred uploads are not picked up
pub const DEBOUNCE_MILLIS: u64 = 500;
