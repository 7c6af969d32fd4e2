//! File validation: magic bytes and size limits

use crate::error::{Rejection, Result};
use crate::{MAX_IMAGE_BYTES, MAX_REPORT_BYTES};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// JPEG files start with `FF D8 FF`
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Validate an image file: JPEG magic bytes, size at most 10 MiB.
///
/// # Errors
/// Returns the matching [`Rejection`] wrapped in [`crate::IngestError`].
pub fn validate_image(path: &Path) -> Result<()> {
    validate_size(path, MAX_IMAGE_BYTES)?;

    let mut magic = [0u8; 3];
    let mut file = File::open(path)?;
    let read = file.read(&mut magic)?;
    if read < magic.len() || magic != JPEG_MAGIC {
        return Err(Rejection::InvalidMagicBytes(format!(
            "{} (expected ffd8ff)",
            hex_prefix(&magic[..read])
        ))
        .into());
    }
    Ok(())
}

/// Validate a daily report file: size only, 1 MiB limit.
///
/// # Errors
/// Returns `Rejection::FileTooLarge` for oversized reports.
pub fn validate_daily_report(path: &Path) -> Result<()> {
    validate_size(path, MAX_REPORT_BYTES)
}

fn validate_size(path: &Path, limit_bytes: u64) -> Result<()> {
    let size_bytes = std::fs::metadata(path)?.len();
    if size_bytes > limit_bytes {
        return Err(Rejection::FileTooLarge {
            size_bytes,
            limit_bytes,
        }
        .into());
    }
    Ok(())
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
