//! Ingestion error taxonomy
//!
//! [`Rejection`] is a verdict on the file itself and routes it to a
//! reason-named quarantine directory. [`IngestError`] additionally covers
//! infrastructure failures, which leave the file in the drop directory for
//! retry.

use thiserror::Error;

/// Why a file was quarantined. The kebab-less snake names double as the
/// quarantine subdirectory names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Rejection {
    /// Extension is neither an image nor a daily report
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// File does not start with the JPEG magic bytes `FF D8 FF`
    #[error("invalid JPEG magic bytes: {0}")]
    InvalidMagicBytes(String),

    /// File exceeds the size limit
    #[error("file too large: {size_bytes} bytes > {limit_bytes} byte limit")]
    FileTooLarge {
        size_bytes: u64,
        limit_bytes: u64,
    },

    /// EXIF block missing or unreadable
    #[error("could not extract EXIF metadata: {0}")]
    ExifExtractionFailed(String),

    /// No camera profile matched the EXIF make/model
    #[error("unsupported camera: {0}")]
    UnsupportedCamera(String),

    /// The matched profile could not derive a camera identifier
    #[error("missing camera id: {0}")]
    MissingCameraId(String),

    /// DateTimeOriginal required by the profile but absent or unparseable
    #[error("missing capture datetime: {0}")]
    MissingDatetime(String),

    /// Same (camera, filename, capture time) already ingested
    #[error("duplicate image: {0}")]
    Duplicate(String),

    /// Daily report text did not parse
    #[error("daily report parse failed: {0}")]
    ParseFailed(String),
}

impl Rejection {
    /// Quarantine subdirectory for this rejection
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::UnsupportedFileType(_) => "unsupported_file_type",
            Rejection::InvalidMagicBytes(_) => "mime_type",
            Rejection::FileTooLarge { .. } => "file_size",
            Rejection::ExifExtractionFailed(_) => "exif_extraction_failed",
            Rejection::UnsupportedCamera(_) => "unsupported_camera",
            Rejection::MissingCameraId(_) => "missing_camera_id",
            Rejection::MissingDatetime(_) => "missing_datetime",
            Rejection::Duplicate(_) => "duplicate",
            Rejection::ParseFailed(_) => "parse_failed",
        }
    }

    /// Every quarantine directory, created at startup
    pub const ALL_REASONS: &'static [&'static str] = &[
        "unsupported_file_type",
        "mime_type",
        "file_size",
        "exif_extraction_failed",
        "unsupported_camera",
        "missing_camera_id",
        "missing_datetime",
        "duplicate",
        "parse_failed",
    ];
}

/// Errors raised while processing one dropped file
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    /// The file itself is bad; quarantine and continue
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Store failure; leave the file for retry
    #[error(transparent)]
    Db(#[from] trapline_db::Error),

    /// Object-store failure; leave the file for retry
    #[error(transparent)]
    Storage(#[from] trapline_storage::Error),

    /// Broker failure; leave the file for retry
    #[error(transparent)]
    Queue(#[from] trapline_queue::Error),

    /// Local filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode failure while generating the thumbnail
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON encode/decode failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_names_match_the_quarantine_layout() {
        let rejections = [
            Rejection::UnsupportedFileType("x".into()),
            Rejection::InvalidMagicBytes("x".into()),
            Rejection::FileTooLarge { size_bytes: 1, limit_bytes: 0 },
            Rejection::ExifExtractionFailed("x".into()),
            Rejection::UnsupportedCamera("x".into()),
            Rejection::MissingCameraId("x".into()),
            Rejection::MissingDatetime("x".into()),
            Rejection::Duplicate("x".into()),
            Rejection::ParseFailed("x".into()),
        ];
        for rejection in &rejections {
            assert!(Rejection::ALL_REASONS.contains(&rejection.reason()));
        }
    }

    #[test]
    fn test_file_too_large_display() {
        let rejection = Rejection::FileTooLarge {
            size_bytes: 11 * 1024 * 1024,
            limit_bytes: 10 * 1024 * 1024,
        };
        assert!(format!("{rejection}").contains("byte limit"));
    }
}
