//! Species-classification worker
//!
//! Consumes `detection-complete`: crops each animal detection to a square,
//! classifies it against the closed species vocabulary, applies the project's
//! species filter with renormalization, renders the annotated image (with
//! optional privacy blur), publishes one `notification-events` message per
//! unique species, and finishes the image at `classified`.
//!
//! The reprocess worker (`classification-reprocess` consumer) re-filters
//! stored probability vectors after a project's species list changes; it
//! never re-runs inference.

pub mod annotate;
pub mod crop;
pub mod filter;
pub mod model;
pub mod reprocess;
pub mod species;
pub mod worker;

pub use model::{ensure_model, Classifier, OnnxClassifier};
pub use worker::ClassificationWorker;

use thiserror::Error;

/// Errors raised by the classification worker
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClassifyError {
    /// Store failure
    #[error(transparent)]
    Db(#[from] trapline_db::Error),

    /// Object-store failure
    #[error(transparent)]
    Storage(#[from] trapline_storage::Error),

    /// Broker failure
    #[error(transparent)]
    Queue(#[from] trapline_queue::Error),

    /// Image decode/encode failure
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

/// Result type for classification operations
pub type Result<T> = std::result::Result<T, ClassifyError>;
