//! Independence-interval event grouping
//!
//! Camera-trap ecology treats a burst of images of the same species at the
//! same camera as one "independent event" when the frames are close together
//! in time. Given a project interval `I` minutes, an observation opens a new
//! event iff the gap to the previous same-species same-camera observation is
//! absent or greater than `I`.
//!
//! Counting rules: if multiple detections of one species occur in one image,
//! the per-image count is their sum (for verified images the curator's counts
//! are summed instead); the per-event count is the maximum per-image count
//! within the event, since one group photographed across several frames must
//! not be double-counted.
//!
//! This grouping is recomputable purely from stored data - it takes plain
//! observation rows and is used by report statistics and exports.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One species observation attributed to a single image
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub camera_id: i32,
    pub species: String,
    /// Capture time of the image
    pub captured_at: DateTime<Utc>,
    /// Individuals in this image: `HumanObservation.count` for verified
    /// images, 1 per classification otherwise
    pub count: i64,
}

/// One independent event after grouping
#[derive(Debug, Clone, PartialEq)]
pub struct IndependentEvent {
    pub camera_id: i32,
    pub species: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Maximum per-image count within the event
    pub count: i64,
}

/// Group observations into independent events.
///
/// Input order does not matter; observations are bucketed by
/// (camera, species), collapsed per image timestamp (counts summed), sorted,
/// and folded with the gap rule.
pub fn group_events(observations: &[Observation], interval_minutes: i64) -> Vec<IndependentEvent> {
    // (camera, species) -> captured_at -> per-image count
    let mut streams: BTreeMap<(i32, &str), BTreeMap<DateTime<Utc>, i64>> = BTreeMap::new();
    for obs in observations {
        *streams
            .entry((obs.camera_id, obs.species.as_str()))
            .or_default()
            .entry(obs.captured_at)
            .or_insert(0) += obs.count;
    }

    let mut events = Vec::new();
    for ((camera_id, species), images) in streams {
        let mut open: Option<IndependentEvent> = None;
        for (ts, image_count) in images {
            // Gaps are fractional: compare at second precision so a gap of
            // interval plus a few seconds still opens a new event.
            match open.as_mut() {
                Some(event)
                    if (ts - event.end).num_seconds() <= interval_minutes * 60 =>
                {
                    event.end = ts;
                    event.count = event.count.max(image_count);
                }
                _ => {
                    if let Some(done) = open.take() {
                        events.push(done);
                    }
                    open = Some(IndependentEvent {
                        camera_id,
                        species: species.to_string(),
                        start: ts,
                        end: ts,
                        count: image_count,
                    });
                }
            }
        }
        if let Some(done) = open {
            events.push(done);
        }
    }
    events
}

/// Total individuals per species across all events
pub fn species_totals(events: &[IndependentEvent]) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for event in events {
        *totals.entry(event.species.clone()).or_insert(0) += event.count;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 5, 6, minute, 0).unwrap()
    }

    fn obs(camera_id: i32, species: &str, minute: u32, count: i64) -> Observation {
        Observation {
            camera_id,
            species: species.to_string(),
            captured_at: at(minute),
            count,
        }
    }

    #[test]
    fn test_gap_above_interval_opens_new_event() {
        let observations = vec![
            obs(1, "fox", 0, 1),
            obs(1, "fox", 10, 1),
            // 45 minute gap with a 30 minute interval: second event.
            obs(1, "fox", 55, 1),
        ];
        let events = group_events(&observations, 30);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start, at(0));
        assert_eq!(events[0].end, at(10));
        assert_eq!(events[1].start, at(55));
    }

    #[test]
    fn test_gap_equal_to_interval_merges() {
        let observations = vec![obs(1, "fox", 0, 1), obs(1, "fox", 30, 1)];
        assert_eq!(group_events(&observations, 30).len(), 1);
    }

    #[test]
    fn test_sub_minute_excess_over_interval_splits() {
        // 30 minutes 30 seconds at a 30 minute interval: strictly greater
        // than the interval, so a new event opens even though the gap
        // truncates to 30 whole minutes.
        let late = Observation {
            camera_id: 1,
            species: "fox".to_string(),
            captured_at: Utc.with_ymd_and_hms(2025, 12, 5, 6, 30, 30).unwrap(),
            count: 1,
        };
        let observations = vec![obs(1, "fox", 0, 1), late];
        assert_eq!(group_events(&observations, 30).len(), 2);
    }

    #[test]
    fn test_per_image_sum_and_per_event_max() {
        // Two detections of the same species in one frame sum to 2; a later
        // frame within the event showing 3 individuals lifts the event count
        // to 3, not 5.
        let observations = vec![
            obs(1, "wild_boar", 0, 1),
            obs(1, "wild_boar", 0, 1),
            obs(1, "wild_boar", 5, 3),
        ];
        let events = group_events(&observations, 30);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].count, 3);
    }

    #[test]
    fn test_species_and_cameras_are_independent_streams() {
        let observations = vec![
            obs(1, "fox", 0, 1),
            obs(1, "badger", 1, 1),
            obs(2, "fox", 2, 1),
        ];
        let events = group_events(&observations, 30);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_unordered_input() {
        let observations = vec![
            obs(1, "fox", 55, 1),
            obs(1, "fox", 0, 1),
            obs(1, "fox", 10, 1),
        ];
        let events = group_events(&observations, 30);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_species_totals_sum_event_counts() {
        let observations = vec![
            obs(1, "fox", 0, 2),
            obs(1, "fox", 120, 1),
            obs(2, "fox", 0, 1),
            obs(1, "badger", 0, 1),
        ];
        let events = group_events(&observations, 30);
        let totals = species_totals(&events);
        assert_eq!(totals.get("fox"), Some(&4));
        assert_eq!(totals.get("badger"), Some(&1));
    }

    #[test]
    fn test_empty_input() {
        assert!(group_events(&[], 30).is_empty());
    }
}
