//! Notification rule engine
//!
//! Decides, per event, which (recipient, channel) pairs receive a message.
//! The rules are pure over already-loaded recipients so they are fully unit
//! testable:
//!
//! - `species_detection` requires BOTH the classification confidence and the
//!   originating detection confidence to clear the project threshold. A
//!   missing confidence drops the event - defaulting to 0 would silently
//!   pass a gate that was never evaluated. A per-user species allowlist
//!   narrows further.
//! - `system_health` is admin-only and severity-gated per user.
//! - `low_battery` single-camera events are ignored entirely; battery alerts
//!   ship as a scheduled digest.

use trapline_core::messages::{NotificationEvent, SpeciesDetectionEvent, SystemHealthEvent};
use trapline_core::model::Channel;
use trapline_db::notifications::Recipient;

/// One delivery decision
#[derive(Debug, Clone)]
pub struct Match<'a> {
    pub recipient: &'a Recipient,
    pub channel: Channel,
}

/// Evaluate an event against the project's recipients.
/// `detection_threshold` is the owning project's configured threshold.
pub fn matching_deliveries<'a>(
    event: &NotificationEvent,
    recipients: &'a [Recipient],
    detection_threshold: f64,
) -> Vec<Match<'a>> {
    match event {
        NotificationEvent::SpeciesDetection(event) => {
            species_matches(event, recipients, detection_threshold)
        }
        NotificationEvent::SystemHealth(event) => health_matches(event, recipients),
        NotificationEvent::LowBattery(_) => {
            tracing::info!("ignoring low_battery event, batteries are digested daily");
            Vec::new()
        }
    }
}

fn species_matches<'a>(
    event: &SpeciesDetectionEvent,
    recipients: &'a [Recipient],
    detection_threshold: f64,
) -> Vec<Match<'a>> {
    // Both confidences must be present AND above threshold.
    let confident = matches!(event.confidence, Some(c) if c >= detection_threshold)
        && matches!(event.detection_confidence, Some(c) if c >= detection_threshold);
    if !confident {
        tracing::debug!(
            species = event.species.as_str(),
            confidence = ?event.confidence,
            detection_confidence = ?event.detection_confidence,
            threshold = detection_threshold,
            "species detection below threshold, suppressed"
        );
        return Vec::new();
    }

    let mut matches = Vec::new();
    for recipient in recipients {
        let pref = &recipient.preference;
        if !pref.enabled {
            continue;
        }
        let Some(config) = pref.channels.species_detection.as_ref() else {
            continue;
        };
        if !config.enabled {
            continue;
        }
        if let Some(allowlist) = config.species.as_ref() {
            if !allowlist.iter().any(|s| s == &event.species) {
                continue;
            }
        }
        for channel in pref.deliverable_channels(&config.channels) {
            matches.push(Match { recipient, channel });
        }
    }
    matches
}

fn health_matches<'a>(event: &SystemHealthEvent, recipients: &'a [Recipient]) -> Vec<Match<'a>> {
    let mut matches = Vec::new();
    for recipient in recipients {
        if !recipient.is_server_admin {
            continue;
        }
        let pref = &recipient.preference;
        if !pref.enabled {
            continue;
        }
        let Some(config) = pref.channels.system_health.as_ref() else {
            continue;
        };
        if !config.enabled || event.severity.rank() < config.min_severity.rank() {
            continue;
        }
        for channel in pref.deliverable_channels(&config.channels) {
            matches.push(Match { recipient, channel });
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use trapline_core::model::{
        NotificationChannels, NotificationPreference, Severity, SpeciesDetectionConfig,
        SystemHealthConfig,
    };
    use uuid::Uuid;

    fn recipient(
        enabled: bool,
        config: Option<SpeciesDetectionConfig>,
        is_server_admin: bool,
    ) -> Recipient {
        Recipient {
            preference: NotificationPreference {
                id: 1,
                user_id: 7,
                project_id: 3,
                enabled,
                telegram_chat_id: Some("12345".to_string()),
                signal_phone: Some("+31600000000".to_string()),
                channels: NotificationChannels {
                    species_detection: config,
                    ..NotificationChannels::default()
                },
            },
            email: "ranger@example.org".to_string(),
            is_server_admin,
        }
    }

    fn species_event(confidence: Option<f64>, detection_confidence: Option<f64>) -> NotificationEvent {
        NotificationEvent::SpeciesDetection(SpeciesDetectionEvent {
            project_id: 3,
            image_uuid: Uuid::nil(),
            camera_id: 2,
            camera_name: "WUH07".to_string(),
            camera_location: None,
            species: "wolf".to_string(),
            confidence,
            detection_confidence,
            detection_count: 1,
            annotated_minio_path: None,
            timestamp: None,
        })
    }

    fn enabled_config(channels: Vec<Channel>, species: Option<Vec<String>>) -> SpeciesDetectionConfig {
        SpeciesDetectionConfig {
            enabled: true,
            channels,
            species,
        }
    }

    #[test]
    fn test_confident_event_matches_enabled_channels() {
        let recipients = vec![recipient(
            true,
            Some(enabled_config(vec![Channel::Telegram, Channel::Email], None)),
            false,
        )];
        let matches = matching_deliveries(&species_event(Some(0.88), Some(0.7)), &recipients, 0.5);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].channel, Channel::Telegram);
        assert_eq!(matches[1].channel, Channel::Email);
    }

    #[test]
    fn test_low_detection_confidence_suppresses() {
        // Classification is confident but the originating detection is weak:
        // no deliveries at all.
        let recipients = vec![recipient(
            true,
            Some(enabled_config(vec![Channel::Telegram], None)),
            false,
        )];
        let matches = matching_deliveries(&species_event(Some(0.88), Some(0.15)), &recipients, 0.5);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_missing_confidence_drops_the_event() {
        let recipients = vec![recipient(
            true,
            Some(enabled_config(vec![Channel::Telegram], None)),
            false,
        )];
        assert!(matching_deliveries(&species_event(None, Some(0.9)), &recipients, 0.5).is_empty());
        assert!(matching_deliveries(&species_event(Some(0.9), None), &recipients, 0.5).is_empty());
    }

    #[test]
    fn test_species_allowlist_filters() {
        let allow_wolf = recipient(
            true,
            Some(enabled_config(
                vec![Channel::Signal],
                Some(vec!["wolf".to_string()]),
            )),
            false,
        );
        let allow_fox_only = recipient(
            true,
            Some(enabled_config(
                vec![Channel::Signal],
                Some(vec!["fox".to_string()]),
            )),
            false,
        );
        let recipients = vec![allow_wolf, allow_fox_only];
        let matches = matching_deliveries(&species_event(Some(0.9), Some(0.9)), &recipients, 0.5);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_disabled_preference_or_config_is_skipped() {
        let disabled_pref = recipient(
            false,
            Some(enabled_config(vec![Channel::Telegram], None)),
            false,
        );
        let disabled_config = recipient(
            true,
            Some(SpeciesDetectionConfig {
                enabled: false,
                channels: vec![Channel::Telegram],
                species: None,
            }),
            false,
        );
        let unconfigured = recipient(true, None, false);
        let recipients = vec![disabled_pref, disabled_config, unconfigured];
        assert!(matching_deliveries(&species_event(Some(0.9), Some(0.9)), &recipients, 0.5).is_empty());
    }

    #[test]
    fn test_channels_without_contact_info_are_dropped() {
        let mut r = recipient(
            true,
            Some(enabled_config(vec![Channel::Telegram, Channel::Signal], None)),
            false,
        );
        r.preference.telegram_chat_id = None;
        let recipients = vec![r];
        let matches = matching_deliveries(&species_event(Some(0.9), Some(0.9)), &recipients, 0.5);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].channel, Channel::Signal);
    }

    #[test]
    fn test_system_health_is_admin_only_and_severity_gated() {
        let health_config = |min_severity| {
            let mut r = recipient(true, None, true);
            r.preference.channels.system_health = Some(SystemHealthConfig {
                enabled: true,
                channels: vec![Channel::Email],
                min_severity,
            });
            r
        };
        let admin_warning = health_config(Severity::Warning);
        let admin_critical_only = health_config(Severity::Critical);
        let mut non_admin = health_config(Severity::Warning);
        non_admin.is_server_admin = false;

        let event = NotificationEvent::SystemHealth(SystemHealthEvent {
            project_id: 3,
            alert_type: "queue_backlog".to_string(),
            severity: Severity::Error,
            message: "detection queue depth above 1000".to_string(),
            details: serde_json::Value::Null,
            timestamp: None,
        });

        let recipients = vec![admin_warning, admin_critical_only, non_admin];
        let matches = matching_deliveries(&event, &recipients, 0.5);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_low_battery_events_are_ignored() {
        let raw = r#"{"event_type":"low_battery","camera_id":4}"#;
        let event: NotificationEvent = serde_json::from_str(raw).expect("parse");
        let recipients = vec![recipient(
            true,
            Some(enabled_config(vec![Channel::Telegram], None)),
            false,
        )];
        assert!(matching_deliveries(&event, &recipients, 0.5).is_empty());
    }
}
