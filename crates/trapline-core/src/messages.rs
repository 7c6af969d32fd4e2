//! Queue message payloads
//!
//! One schema per pipeline stage. Every stage owns its schema; all fields are
//! present unless `Option`. Queue name constants live in `trapline-queue`.

use crate::model::{GeoPoint, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published by the ingestion worker after an image row exists and the raw
/// blob is uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageIngested {
    pub image_uuid: Uuid,
    pub storage_path: String,
    pub camera_id: i32,
}

/// Published by the detection worker once all detections are persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionComplete {
    pub image_uuid: Uuid,
    pub num_detections: u32,
    pub detection_ids: Vec<i32>,
}

/// Published by the classification worker once the image reaches `classified`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationComplete {
    pub image_uuid: Uuid,
    pub num_classifications: u32,
    pub classification_ids: Vec<i32>,
}

/// Requests a top-1 recomputation after a project's species list changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReprocess {
    pub image_uuid: Uuid,
    pub project_id: i32,
    pub excluded_species: Vec<String>,
}

/// Events consumed by the notification core, discriminated by `event_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A species was classified in a freshly processed image
    SpeciesDetection(SpeciesDetectionEvent),
    /// Operational alert raised by a service
    SystemHealth(SystemHealthEvent),
    /// Single-camera battery events from old firmware bridges. Ignored - the
    /// scheduled digest replaced them - but still parsed so redeliveries
    /// drain instead of dead-lettering.
    LowBattery(LegacyLowBatteryEvent),
}

/// One per unique species per image, carrying the highest-confidence
/// classification of that species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesDetectionEvent {
    pub project_id: i32,
    pub image_uuid: Uuid,
    pub camera_id: i32,
    pub camera_name: String,
    /// Image GPS when present, otherwise the camera's configured location
    pub camera_location: Option<GeoPoint>,
    pub species: String,
    /// Classification confidence (after species-filter renormalization)
    pub confidence: Option<f64>,
    /// Confidence of the originating detection
    pub detection_confidence: Option<f64>,
    /// Total classifications written for the image
    pub detection_count: u32,
    /// Object-store path of the annotated JPEG, when rendering succeeded
    pub annotated_minio_path: Option<String>,
    /// Capture timestamp (EXIF DateTimeOriginal) as published
    pub timestamp: Option<String>,
}

/// Operational alert payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthEvent {
    pub project_id: i32,
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Whatever an old bridge published; never inspected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyLowBatteryEvent {
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Telegram channel queue payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramDelivery {
    pub notification_log_id: i32,
    pub chat_id: String,
    pub message_text: String,
    /// Object-store reference of the attachment (annotated image)
    pub attachment_url: Option<String>,
    /// Inline keyboard in Bot API shape
    pub reply_markup: Option<serde_json::Value>,
}

/// Signal channel queue payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDelivery {
    pub notification_log_id: i32,
    pub recipient_phone: String,
    pub message_text: String,
    pub attachment_url: Option<String>,
}

/// Email channel queue payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDelivery {
    pub notification_log_id: i32,
    pub to_email: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
}

/// Entry on the `failed-jobs` dead-letter queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Queue the message was consumed from
    pub queue: String,
    /// Original payload, verbatim
    pub payload: serde_json::Value,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ingested_wire_shape() {
        let msg = ImageIngested {
            image_uuid: Uuid::nil(),
            storage_path: "861943070068027/2025/12/00000000-0000-0000-0000-000000000000_E1000159.JPG".to_string(),
            camera_id: 7,
        };
        let value = serde_json::to_value(&msg).ok();
        let obj = value.as_ref().and_then(|v| v.as_object());
        assert!(obj.map(|m| m.contains_key("image_uuid")).unwrap_or(false));
        assert!(obj.map(|m| m.contains_key("storage_path")).unwrap_or(false));
        assert!(obj.map(|m| m.contains_key("camera_id")).unwrap_or(false));
    }

    #[test]
    fn test_species_detection_event_tag() {
        let event = NotificationEvent::SpeciesDetection(SpeciesDetectionEvent {
            project_id: 1,
            image_uuid: Uuid::nil(),
            camera_id: 2,
            camera_name: "WUH09".to_string(),
            camera_location: Some(GeoPoint::new(52.0986, 5.1253)),
            species: "wolf".to_string(),
            confidence: Some(0.91),
            detection_confidence: Some(0.88),
            detection_count: 1,
            annotated_minio_path: Some("annotated/abc.jpg".to_string()),
            timestamp: Some("2025:12:16 18:21:25".to_string()),
        });
        let json = serde_json::to_value(&event).ok();
        assert_eq!(
            json.as_ref().and_then(|v| v["event_type"].as_str()),
            Some("species_detection")
        );
        assert_eq!(
            json.as_ref().and_then(|v| v["camera_location"]["lat"].as_f64()),
            Some(52.0986)
        );
    }

    #[test]
    fn test_low_battery_events_still_parse() {
        let raw = r#"{"event_type":"low_battery","camera_id":4,"battery_percentage":18}"#;
        let event: Result<NotificationEvent, _> = serde_json::from_str(raw);
        assert!(matches!(event, Ok(NotificationEvent::LowBattery(_))));
    }

    #[test]
    fn test_missing_confidence_deserializes_as_none() {
        // Upstream bridges occasionally drop the confidence fields; the rule
        // engine must see None rather than a defaulted 0.
        let raw = r#"{
            "event_type": "species_detection",
            "project_id": 1,
            "image_uuid": "00000000-0000-0000-0000-000000000000",
            "camera_id": 2,
            "camera_name": "WUH01",
            "camera_location": null,
            "species": "fox",
            "confidence": null,
            "detection_confidence": null,
            "detection_count": 1,
            "annotated_minio_path": null,
            "timestamp": null
        }"#;
        match serde_json::from_str::<NotificationEvent>(raw) {
            Ok(NotificationEvent::SpeciesDetection(event)) => {
                assert!(event.confidence.is_none());
                assert!(event.detection_confidence.is_none());
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_reprocess_round_trip() {
        let msg = ClassificationReprocess {
            image_uuid: Uuid::nil(),
            project_id: 9,
            excluded_species: vec!["human".to_string(), "empty".to_string()],
        };
        let json = serde_json::to_string(&msg).ok();
        let back: Option<ClassificationReprocess> =
            json.as_deref().and_then(|s| serde_json::from_str(s).ok());
        assert_eq!(back, Some(msg));
    }
}
