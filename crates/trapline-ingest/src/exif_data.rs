//! EXIF extraction
//!
//! In-process parsing with kamadak-exif. The fields the pipeline consumes
//! are make, model, body serial number, DateTimeOriginal and GPS; everything
//! else rides along in the metadata map untouched.

use crate::error::{Rejection, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use exif::{Exif, In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};
use trapline_core::model::ImageMetadata;

/// EXIF capture timestamp format: `2025:12:05 15:46:07`
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Extract the metadata the pipeline needs from a JPEG.
///
/// # Errors
/// Returns `Rejection::ExifExtractionFailed` when the file has no readable
/// EXIF block at all. Individual missing fields are not errors; the camera
/// profile decides what is mandatory.
pub fn extract_metadata(path: &Path) -> Result<ImageMetadata> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(&file);
    let exif = exif::Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| Rejection::ExifExtractionFailed(e.to_string()))?;

    let mut metadata = ImageMetadata {
        make: ascii_field(&exif, Tag::Make),
        model: ascii_field(&exif, Tag::Model),
        serial_number: ascii_field(&exif, Tag::BodySerialNumber),
        datetime_original: ascii_field(&exif, Tag::DateTimeOriginal),
        ..ImageMetadata::default()
    };

    if let Some(gps) = gps_decimal(&exif) {
        if gps == (0.0, 0.0) {
            warn!("ignoring invalid (0, 0) GPS coordinates");
        } else {
            metadata.gps_decimal = Some(gps);
        }
    }

    debug!(
        make = metadata.make.as_deref(),
        model = metadata.model.as_deref(),
        has_serial = metadata.serial_number.is_some(),
        has_gps = metadata.gps_decimal.is_some(),
        "EXIF extracted"
    );
    Ok(metadata)
}

/// Capture time: EXIF DateTimeOriginal, else file mtime when the camera
/// profile allows the fallback.
///
/// Camera clocks are timezone-naive; timestamps are taken as UTC, the
/// convention the rest of the system reads them back with.
///
/// # Errors
/// Returns `Rejection::MissingDatetime` when DateTimeOriginal is absent or
/// unparseable and the profile forbids falling back.
pub fn capture_time(
    metadata: &ImageMetadata,
    path: &Path,
    allow_fallback: bool,
) -> Result<DateTime<Utc>> {
    if let Some(raw) = metadata.datetime_original.as_deref() {
        match NaiveDateTime::parse_from_str(raw, EXIF_DATETIME_FORMAT) {
            Ok(naive) => return Ok(Utc.from_utc_datetime(&naive)),
            Err(e) if !allow_fallback => {
                return Err(
                    Rejection::MissingDatetime(format!("unparseable DateTimeOriginal {raw:?}: {e}"))
                        .into(),
                )
            }
            Err(e) => warn!(raw, error = %e, "unparseable DateTimeOriginal, falling back to mtime"),
        }
    } else if !allow_fallback {
        return Err(Rejection::MissingDatetime("DateTimeOriginal missing in EXIF".to_string()).into());
    }

    let mtime = std::fs::metadata(path)?.modified()?;
    let fallback: DateTime<Utc> = mtime.into();
    warn!(path = %path.display(), mtime = %fallback, "using file mtime as capture time");
    Ok(fallback)
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(groups) => groups
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn gps_decimal(exif: &Exif) -> Option<(f64, f64)> {
    let lat = dms_field(exif, Tag::GPSLatitude)?;
    let lon = dms_field(exif, Tag::GPSLongitude)?;
    let lat_sign = hemisphere_sign(exif, Tag::GPSLatitudeRef, 'S')?;
    let lon_sign = hemisphere_sign(exif, Tag::GPSLongitudeRef, 'W')?;
    Some((lat * lat_sign, lon * lon_sign))
}

/// Degrees/minutes/seconds rationals to decimal degrees
fn dms_field(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(parts) if parts.len() >= 3 => {
            let degrees = parts[0].to_f64();
            let minutes = parts[1].to_f64();
            let seconds = parts[2].to_f64();
            Some(degrees + minutes / 60.0 + seconds / 3600.0)
        }
        _ => None,
    }
}

fn hemisphere_sign(exif: &Exif, tag: Tag, negative: char) -> Option<f64> {
    let reference = ascii_field(exif, tag)?;
    if reference.starts_with(negative) {
        Some(-1.0)
    } else {
        Some(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_time_parses_exif_format() {
        let metadata = ImageMetadata {
            datetime_original: Some("2025:12:05 15:46:07".to_string()),
            ..ImageMetadata::default()
        };
        let path = Path::new("/nonexistent");
        let parsed = capture_time(&metadata, path, false).ok();
        assert_eq!(
            parsed,
            Some(Utc.with_ymd_and_hms(2025, 12, 5, 15, 46, 7).unwrap())
        );
    }

    #[test]
    fn test_missing_datetime_without_fallback_rejects() {
        let metadata = ImageMetadata::default();
        let result = capture_time(&metadata, Path::new("/nonexistent"), false);
        assert!(matches!(
            result,
            Err(crate::IngestError::Rejected(Rejection::MissingDatetime(_)))
        ));
    }

    #[test]
    fn test_garbled_datetime_without_fallback_rejects() {
        let metadata = ImageMetadata {
            datetime_original: Some("yesterday-ish".to_string()),
            ..ImageMetadata::default()
        };
        let result = capture_time(&metadata, Path::new("/nonexistent"), false);
        assert!(matches!(
            result,
            Err(crate::IngestError::Rejected(Rejection::MissingDatetime(_)))
        ));
    }

    #[test]
    fn test_mtime_fallback_when_allowed() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let metadata = ImageMetadata::default();
        let resolved = capture_time(&metadata, file.path(), true).ok();
        assert!(resolved.is_some());
    }
}
