//! Message text rendering for the push channels
//!
//! Telegram and Signal both accept the same Markdown-flavored body; Telegram
//! additionally gets an inline keyboard with Map/View buttons.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use trapline_core::messages::{SpeciesDetectionEvent, SystemHealthEvent};
use trapline_core::model::GeoPoint;

/// `wolf` -> `Wolf`; `roe_deer` -> `Roe deer` (sentence case, as the push
/// messages read best)
pub fn species_sentence_case(species: &str) -> String {
    let spaced = species.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Parse the event timestamp: RFC 3339 first, then the EXIF format cameras
/// write (`2025:12:16 18:21:25`)
pub fn parse_event_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Body of a species-detection push message
pub fn species_detection_message(
    event: &SpeciesDetectionEvent,
    project_name: &str,
) -> String {
    let (time_line, date_line) = match event.timestamp.as_deref().and_then(parse_event_timestamp) {
        Some(at) => (
            at.format("%H:%M:%S").to_string(),
            at.format("%a, %d %b %Y").to_string(),
        ),
        None => ("Unknown".to_string(), "Unknown".to_string()),
    };

    format!(
        "*{species} detected!*\n*Camera:* {camera}\n*Time:* {time}\n*Date:* {date}\n*Project:* {project}",
        species = species_sentence_case(&event.species),
        camera = event.camera_name,
        time = time_line,
        date = date_line,
        project = project_name,
    )
}

/// Body of a system-health push message
pub fn system_health_message(event: &SystemHealthEvent) -> String {
    format!(
        "System health alert: {}\nSeverity: {}\n{}",
        event.alert_type, event.severity, event.message
    )
}

/// Body of a battery-digest message
pub fn battery_digest_message(project_name: &str, camera_count: i64, threshold: i32) -> String {
    let cameras = if camera_count == 1 {
        "camera is"
    } else {
        "cameras are"
    };
    format!(
        "*Battery alert for project \"{project_name}\"*\n\n{camera_count} {cameras} below your {threshold}% battery threshold"
    )
}

/// Deep link into the project's image list
pub fn project_images_url(domain: &str, project_id: i32) -> String {
    format!("https://{domain}/projects/{project_id}/images")
}

/// Deep link into the project's camera view
pub fn project_cameras_url(domain: &str, project_id: i32) -> String {
    format!("https://{domain}/projects/{project_id}/cameras")
}

/// Inline keyboard with an optional Map button and a View button
pub fn species_keyboard(location: Option<GeoPoint>, view_url: &str) -> serde_json::Value {
    let mut row = Vec::new();
    if let Some(point) = location {
        row.push(serde_json::json!({
            "text": "Map",
            "url": format!("https://maps.google.com/?q={},{}", point.lat, point.lon),
        }));
    }
    row.push(serde_json::json!({ "text": "View", "url": view_url }));
    serde_json::json!({ "inline_keyboard": [row] })
}

/// Single-button keyboard for digests
pub fn view_keyboard(text: &str, url: &str) -> serde_json::Value {
    serde_json::json!({ "inline_keyboard": [[{ "text": text, "url": url }]] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(timestamp: Option<&str>) -> SpeciesDetectionEvent {
        SpeciesDetectionEvent {
            project_id: 3,
            image_uuid: Uuid::nil(),
            camera_id: 2,
            camera_name: "WUH07".to_string(),
            camera_location: Some(GeoPoint::new(52.0986, 5.1253)),
            species: "roe_deer".to_string(),
            confidence: Some(0.91),
            detection_confidence: Some(0.8),
            detection_count: 1,
            annotated_minio_path: None,
            timestamp: timestamp.map(str::to_string),
        }
    }

    #[test]
    fn test_species_message_contains_all_lines() {
        let message = species_detection_message(&event(Some("2025:12:16 18:21:25")), "Veluwe");
        assert!(message.starts_with("*Roe deer detected!*"));
        assert!(message.contains("*Camera:* WUH07"));
        assert!(message.contains("*Time:* 18:21:25"));
        assert!(message.contains("*Date:* Tue, 16 Dec 2025"));
        assert!(message.contains("*Project:* Veluwe"));
    }

    #[test]
    fn test_exif_and_rfc3339_timestamps_both_parse() {
        assert!(parse_event_timestamp("2025:12:16 18:21:25").is_some());
        assert!(parse_event_timestamp("2025-12-16T18:21:25Z").is_some());
        assert!(parse_event_timestamp("sometime yesterday").is_none());
    }

    #[test]
    fn test_unknown_timestamp_degrades() {
        let message = species_detection_message(&event(None), "Veluwe");
        assert!(message.contains("*Time:* Unknown"));
    }

    #[test]
    fn test_battery_digest_grammar() {
        assert!(battery_digest_message("Veluwe", 1, 30).contains("1 camera is below"));
        assert!(battery_digest_message("Veluwe", 3, 25).contains("3 cameras are below"));
    }

    #[test]
    fn test_keyboard_includes_map_only_with_location() {
        let with_map = species_keyboard(Some(GeoPoint::new(52.1, 5.1)), "https://x/view");
        assert_eq!(with_map["inline_keyboard"][0].as_array().map(Vec::len), Some(2));

        let without_map = species_keyboard(None, "https://x/view");
        assert_eq!(without_map["inline_keyboard"][0].as_array().map(Vec::len), Some(1));
        assert_eq!(without_map["inline_keyboard"][0][0]["text"], "View");
    }
}
