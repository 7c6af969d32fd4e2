//! Haversine distance and deployment-period clustering
//!
//! A camera "deployment period" is a contiguous interval during which the
//! camera stayed at effectively one location. A GPS change of more than
//! [`RELOCATION_THRESHOLD_METERS`] between consecutive samples starts a new
//! period; the period location is the average of its samples.

use crate::model::GeoPoint;
use chrono::NaiveDate;

/// Earth radius in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// GPS change above this distance counts as a relocation
pub const RELOCATION_THRESHOLD_METERS: f64 = 100.0;

/// Great-circle distance between two points, in meters
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// One dated GPS sample (typically an image's capture date and EXIF GPS)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsSample {
    pub date: NaiveDate,
    pub location: GeoPoint,
}

/// A clustered deployment period candidate
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentCluster {
    /// Averaged location of all samples in the cluster
    pub location: GeoPoint,
    pub start_date: NaiveDate,
    /// Last sample date; the caller decides whether the final cluster stays
    /// open (`end_date = None` in the database)
    pub end_date: NaiveDate,
    /// Number of samples merged into this cluster
    pub sample_count: usize,
}

/// Cluster a chronological sequence of GPS samples into deployment periods.
///
/// The number of clusters equals 1 + the count of consecutive-pair distances
/// above the threshold. Samples at `(0, 0)` must be filtered out upstream.
/// Input order is preserved; samples are not re-sorted.
pub fn cluster_deployments(samples: &[GpsSample]) -> Vec<DeploymentCluster> {
    let mut clusters: Vec<DeploymentCluster> = Vec::new();
    let mut current: Vec<GpsSample> = Vec::new();

    for sample in samples {
        if let Some(previous) = current.last() {
            if haversine_distance_m(previous.location, sample.location)
                > RELOCATION_THRESHOLD_METERS
            {
                clusters.push(close_cluster(&current));
                current.clear();
            }
        }
        current.push(*sample);
    }

    if !current.is_empty() {
        clusters.push(close_cluster(&current));
    }

    clusters
}

/// Whether a new GPS fix constitutes a relocation relative to the current
/// deployment location
pub fn is_relocation(current: GeoPoint, new: GeoPoint) -> bool {
    haversine_distance_m(current, new) > RELOCATION_THRESHOLD_METERS
}

fn close_cluster(samples: &[GpsSample]) -> DeploymentCluster {
    let n = samples.len() as f64;
    let lat = samples.iter().map(|s| s.location.lat).sum::<f64>() / n;
    let lon = samples.iter().map(|s| s.location.lon).sum::<f64>() / n;
    DeploymentCluster {
        location: GeoPoint::new(lat, lon),
        start_date: samples[0].date,
        end_date: samples[samples.len() - 1].date,
        sample_count: samples.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    #[test]
    fn test_haversine_known_distance() {
        // Utrecht Dom tower to Amersfoort station, roughly 19.5 km
        let dom = GeoPoint::new(52.0907, 5.1214);
        let amersfoort = GeoPoint::new(52.1561, 5.3878);
        let d = haversine_distance_m(dom, amersfoort);
        assert!((18_000.0..21_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        let p = GeoPoint::new(52.1, 5.1);
        assert!(haversine_distance_m(p, p) < 1e-9);
    }

    #[test]
    fn test_single_location_is_one_cluster() {
        let samples: Vec<GpsSample> = (1..=5)
            .map(|d| GpsSample {
                date: day(d),
                location: GeoPoint::new(52.100, 5.100),
            })
            .collect();
        let clusters = cluster_deployments(&samples);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].start_date, day(1));
        assert_eq!(clusters[0].end_date, day(5));
        assert_eq!(clusters[0].sample_count, 5);
    }

    #[test]
    fn test_relocation_splits_clusters() {
        // Five days at one spot, then ~720 m away for five more: two periods.
        let mut samples: Vec<GpsSample> = (1..=5)
            .map(|d| GpsSample {
                date: day(d),
                location: GeoPoint::new(52.100, 5.100),
            })
            .collect();
        samples.extend((6..=10).map(|d| GpsSample {
            date: day(d),
            location: GeoPoint::new(52.102, 5.110),
        }));

        let clusters = cluster_deployments(&samples);
        assert_eq!(clusters.len(), 2);
        assert_eq!((clusters[0].start_date, clusters[0].end_date), (day(1), day(5)));
        assert_eq!((clusters[1].start_date, clusters[1].end_date), (day(6), day(10)));

        // Cluster locations are the averages of their members.
        assert!((clusters[0].location.lat - 52.100).abs() < 1e-9);
        assert!((clusters[1].location.lon - 5.110).abs() < 1e-9);
    }

    #[test]
    fn test_small_jitter_does_not_split() {
        // ~20 m of jitter stays within one deployment.
        let samples = vec![
            GpsSample { date: day(1), location: GeoPoint::new(52.10000, 5.10000) },
            GpsSample { date: day(2), location: GeoPoint::new(52.10018, 5.10000) },
            GpsSample { date: day(3), location: GeoPoint::new(52.10000, 5.10020) },
        ];
        assert_eq!(cluster_deployments(&samples).len(), 1);
    }

    #[test]
    fn test_is_relocation_threshold() {
        let base = GeoPoint::new(52.100, 5.100);
        // ~90 m north: below threshold.
        assert!(!is_relocation(base, GeoPoint::new(52.10081, 5.100)));
        // ~720 m away: relocation.
        assert!(is_relocation(base, GeoPoint::new(52.102, 5.110)));
    }

    proptest! {
        #[test]
        fn prop_cluster_count_matches_gap_count(
            lats in proptest::collection::vec(51.0f64..53.0, 1..40)
        ) {
            let samples: Vec<GpsSample> = lats
                .iter()
                .enumerate()
                .map(|(i, lat)| GpsSample {
                    date: NaiveDate::from_num_days_from_ce_opt(738_000 + i as i32).unwrap(),
                    location: GeoPoint::new(*lat, 5.0),
                })
                .collect();

            let gaps = samples
                .windows(2)
                .filter(|w| {
                    haversine_distance_m(w[0].location, w[1].location)
                        > RELOCATION_THRESHOLD_METERS
                })
                .count();

            let clusters = cluster_deployments(&samples);
            prop_assert_eq!(clusters.len(), gaps + 1);

            // Clusters tile the input: sample counts sum to the total.
            let total: usize = clusters.iter().map(|c| c.sample_count).sum();
            prop_assert_eq!(total, samples.len());
        }
    }
}
