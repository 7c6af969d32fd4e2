//! Camera profile registry
//!
//! A profile declares how to recognize a camera family (regexes over the
//! EXIF make/model) and how to derive the camera identifier. Order matters:
//! the first matching profile wins. Unmatched cameras are rejected so new
//! hardware shows up in quarantine instead of producing half-parsed rows.

use crate::error::{Rejection, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use trapline_core::model::ImageMetadata;

/// Resolved camera identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraIdentity {
    /// Human-facing name (friendly name for legacy cameras, serial otherwise)
    pub name: String,
    /// Device serial, when derivable
    pub serial_number: Option<String>,
}

/// How a profile derives the camera identifier
enum IdSource {
    /// Serial number is embedded in EXIF
    ExifSerial,
    /// Legacy models: friendly name from the filename, serial from a static
    /// lookup table
    FilenameLookup {
        pattern: Regex,
        serials: HashMap<&'static str, &'static str>,
    },
}

/// One supported camera family
pub struct CameraProfile {
    pub name: &'static str,
    make_pattern: Option<Regex>,
    model_pattern: Option<Regex>,
    id_source: IdSource,
    /// Whether DateTimeOriginal is mandatory (no mtime fallback)
    pub requires_datetime: bool,
}

impl CameraProfile {
    fn matches(&self, metadata: &ImageMetadata) -> bool {
        let make = metadata.make.as_deref().unwrap_or("");
        let model = metadata.model.as_deref().unwrap_or("");
        let make_ok = self.make_pattern.as_ref().map_or(true, |p| p.is_match(make));
        let model_ok = self.model_pattern.as_ref().map_or(true, |p| p.is_match(model));
        make_ok && model_ok
    }

    /// Derive the camera identity for this file.
    ///
    /// # Errors
    /// Returns `Rejection::MissingCameraId` when the identifier cannot be
    /// derived, including legacy cameras absent from the serial table.
    pub fn camera_identity(&self, metadata: &ImageMetadata, filename: &str) -> Result<CameraIdentity> {
        match &self.id_source {
            IdSource::ExifSerial => match metadata.serial_number.as_deref() {
                Some(serial) => Ok(CameraIdentity {
                    name: serial.to_string(),
                    serial_number: Some(serial.to_string()),
                }),
                None => Err(Rejection::MissingCameraId(format!(
                    "profile {} expects an EXIF serial number, none present",
                    self.name
                ))
                .into()),
            },
            IdSource::FilenameLookup { pattern, serials } => {
                let friendly = pattern
                    .captures(filename)
                    .and_then(|captures| captures.get(1))
                    .map(|m| m.as_str().to_string())
                    .ok_or_else(|| {
                        Rejection::MissingCameraId(format!(
                            "filename {filename:?} does not contain a camera id for profile {}",
                            self.name
                        ))
                    })?;
                let serial = serials.get(friendly.as_str()).ok_or_else(|| {
                    Rejection::MissingCameraId(format!(
                        "unknown {} camera {friendly}; add it to the serial table",
                        self.name
                    ))
                })?;
                Ok(CameraIdentity {
                    name: friendly,
                    serial_number: Some((*serial).to_string()),
                })
            }
        }
    }
}

/// Serial numbers of the 2024-generation cameras, which do not embed a
/// serial in EXIF. Keyed by the friendly name found in filenames.
fn willfine_2024_serials() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("WUH01", "860946063666658"),
        ("WUH02", "860946063362308"),
        ("WUH03", "860946063655883"),
        ("WUH04", "860946063352523"),
        ("WUH05", "860946063653268"),
        ("WUH06", "860946063340346"),
        ("WUH07", "860946063351095"),
        ("WUH08", "860946063337391"),
        ("WUH09", "860946063660255"),
        ("WUH10", "860946063339116"),
        ("WUH11", "860946062360345"),
    ])
}

#[allow(clippy::expect_used)] // SAFETY: patterns are literals, checked by the registry test
fn registry() -> &'static Vec<CameraProfile> {
    static REGISTRY: OnceLock<Vec<CameraProfile>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        vec![
            CameraProfile {
                name: "Willfine-2025",
                make_pattern: Regex::new(r"(?i)Willfine").ok(),
                model_pattern: Regex::new(r"(?i)4\.0T CG").ok(),
                id_source: IdSource::ExifSerial,
                requires_datetime: true,
            },
            CameraProfile {
                name: "Willfine-2024",
                make_pattern: Regex::new(r"(?i)SY").ok(),
                model_pattern: Regex::new(r"(?i)4\.0PCG").ok(),
                id_source: IdSource::FilenameLookup {
                    // e.g. 0000000WUH09-SYPR1113.JPG -> WUH09
                    pattern: Regex::new(r"([A-Z]{3}\d{2})").expect("static pattern"),
                    serials: willfine_2024_serials(),
                },
                requires_datetime: true,
            },
        ]
    })
}

/// Find the first profile matching this image's EXIF make/model.
///
/// # Errors
/// Returns `Rejection::UnsupportedCamera` when nothing matches.
pub fn identify_profile(metadata: &ImageMetadata, filename: &str) -> Result<&'static CameraProfile> {
    registry()
        .iter()
        .find(|profile| profile.matches(metadata))
        .ok_or_else(|| {
            Rejection::UnsupportedCamera(format!(
                "make {:?}, model {:?}, filename {filename:?}; add a camera profile to support it",
                metadata.make, metadata.model
            ))
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IngestError;

    fn metadata(make: &str, model: &str, serial: Option<&str>) -> ImageMetadata {
        ImageMetadata {
            make: Some(make.to_string()),
            model: Some(model.to_string()),
            serial_number: serial.map(str::to_string),
            ..ImageMetadata::default()
        }
    }

    #[test]
    fn test_willfine_2025_matches_and_uses_exif_serial() {
        let md = metadata("Willfine", "4.0T CG", Some("861943070068027"));
        let profile = identify_profile(&md, "E1000159.JPG").expect("profile");
        assert_eq!(profile.name, "Willfine-2025");
        assert!(profile.requires_datetime);

        let identity = profile.camera_identity(&md, "E1000159.JPG").expect("identity");
        assert_eq!(identity.name, "861943070068027");
        assert_eq!(identity.serial_number.as_deref(), Some("861943070068027"));
    }

    #[test]
    fn test_willfine_2024_resolves_serial_from_filename() {
        let md = metadata("SY", "4.0PCG", None);
        let profile = identify_profile(&md, "0000000WUH09-SYPR1113.JPG").expect("profile");
        assert_eq!(profile.name, "Willfine-2024");

        let identity = profile
            .camera_identity(&md, "0000000WUH09-SYPR1113.JPG")
            .expect("identity");
        assert_eq!(identity.name, "WUH09");
        assert_eq!(identity.serial_number.as_deref(), Some("860946063660255"));
    }

    #[test]
    fn test_unknown_legacy_camera_is_missing_camera_id() {
        let md = metadata("SY", "4.0PCG", None);
        let profile = identify_profile(&md, "0000000ABC99-X.JPG").expect("profile");
        let result = profile.camera_identity(&md, "0000000ABC99-X.JPG");
        assert!(matches!(
            result,
            Err(IngestError::Rejected(Rejection::MissingCameraId(_)))
        ));
    }

    #[test]
    fn test_2025_without_serial_is_missing_camera_id() {
        let md = metadata("Willfine", "4.0T CG", None);
        let profile = identify_profile(&md, "E1.JPG").expect("profile");
        assert!(matches!(
            profile.camera_identity(&md, "E1.JPG"),
            Err(IngestError::Rejected(Rejection::MissingCameraId(_)))
        ));
    }

    #[test]
    fn test_unmatched_make_is_unsupported() {
        let md = metadata("Acme", "TrailCam 9000", None);
        assert!(matches!(
            identify_profile(&md, "x.jpg"),
            Err(IngestError::Rejected(Rejection::UnsupportedCamera(_)))
        ));
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let md = metadata("WILLFINE", "4.0t cg", Some("s"));
        assert!(identify_profile(&md, "x.jpg").is_ok());
    }

    #[test]
    fn test_registry_order_first_match_wins() {
        // "SY" also appears inside "WillfineSY-ish" makes; ensure the 2025
        // profile is consulted first for genuine Willfine hardware.
        let md = metadata("Willfine", "4.0T CG", Some("s"));
        let profile = identify_profile(&md, "x.jpg").expect("profile");
        assert_eq!(profile.name, "Willfine-2025");
    }
}
