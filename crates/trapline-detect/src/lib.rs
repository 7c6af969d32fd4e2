//! Object-detection worker
//!
//! Consumes `image-ingested`, runs the object detector over the raw blob,
//! persists detections (pixel and normalized boxes), advances the image
//! status, and publishes `detection-complete`. Inference failures mark the
//! image `failed` and dead-letter the message; there is no automatic retry.

pub mod model;
pub mod worker;

pub use model::{ensure_model, Detector, OnnxDetector, RawDetection};
pub use worker::DetectionWorker;

use thiserror::Error;

/// Errors raised by the detection worker
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DetectError {
    /// Store failure
    #[error(transparent)]
    Db(#[from] trapline_db::Error),

    /// Object-store failure
    #[error(transparent)]
    Storage(#[from] trapline_storage::Error),

    /// Broker failure
    #[error(transparent)]
    Queue(#[from] trapline_queue::Error),

    /// Image decode failure
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Model load or inference failure
    #[error("inference error: {0}")]
    Inference(String),

    /// Model download failure
    #[error("model download error: {0}")]
    Download(String),

    /// Local filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for detection operations
pub type Result<T> = std::result::Result<T, DetectError>;
