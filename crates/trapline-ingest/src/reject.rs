//! Quarantine handling
//!
//! A rejected file is moved to `rejected/<reason>/<name>` next to a
//! `<name>.error.json` sidecar describing what happened, so operators can
//! inspect and replay uploads without trawling logs.

use crate::error::{Rejection, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;
use trapline_core::model::ImageMetadata;

/// Sidecar written next to every quarantined file
#[derive(Debug, Serialize)]
pub struct RejectionSidecar<'a> {
    pub filename: &'a str,
    pub rejected_at: String,
    pub reason: &'a str,
    pub details: String,
    pub file_size_bytes: u64,
    pub exif_metadata: serde_json::Value,
}

/// Create `rejected/<reason>/` for every known reason
///
/// # Errors
/// Returns an error if a directory cannot be created.
pub fn ensure_quarantine_dirs(upload_dir: &Path) -> Result<()> {
    for reason in Rejection::ALL_REASONS {
        std::fs::create_dir_all(upload_dir.join("rejected").join(reason))?;
    }
    Ok(())
}

/// Move a file into quarantine and write its sidecar. Returns the
/// quarantined path.
///
/// # Errors
/// Returns an error if the move or the sidecar write fails.
pub fn quarantine(
    upload_dir: &Path,
    source: &Path,
    rejection: &Rejection,
    exif_metadata: Option<&ImageMetadata>,
) -> Result<PathBuf> {
    let filename = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unnamed".to_string());
    let file_size_bytes = std::fs::metadata(source).map(|m| m.len()).unwrap_or(0);

    let reason = rejection.reason();
    let target_dir = upload_dir.join("rejected").join(reason);
    std::fs::create_dir_all(&target_dir)?;
    let target = target_dir.join(&filename);

    // Rename within the same filesystem; fall back to copy+remove for
    // mounts where the quarantine lives elsewhere.
    if std::fs::rename(source, &target).is_err() {
        std::fs::copy(source, &target)?;
        std::fs::remove_file(source)?;
    }

    let sidecar = RejectionSidecar {
        filename: &filename,
        rejected_at: Utc::now().to_rfc3339(),
        reason,
        details: rejection.to_string(),
        file_size_bytes,
        exif_metadata: exif_metadata
            .map(|m| serde_json::to_value(m).unwrap_or_default())
            .unwrap_or_else(|| serde_json::json!({})),
    };
    let sidecar_path = target_dir.join(format!("{filename}.error.json"));
    std::fs::write(&sidecar_path, serde_json::to_vec_pretty(&sidecar)?)?;

    warn!(
        filename,
        reason,
        details = %rejection,
        dest = %target.display(),
        "file rejected"
    );
    Ok(target)
}
