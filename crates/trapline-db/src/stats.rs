//! Statistics queries feeding periodic reports
//!
//! Aggregation sources follow the verified-override rule: for images with
//! `is_verified = TRUE` species come from human observations; otherwise from
//! classifications whose parent detection clears the project's confidence
//! threshold. Event grouping itself is pure
//! (`trapline_core::events::group_events`) and runs on the rows fetched here,
//! so it stays recomputable from stored data.

use crate::{Database, Result};
use chrono::{DateTime, Utc};
use trapline_core::events::Observation;
use uuid::Uuid;

/// Headline numbers for a report period
#[derive(Debug, Clone, PartialEq)]
pub struct OverviewStats {
    /// All-time image count for the project
    pub total_images: i64,
    /// Images captured within the period
    pub new_images: i64,
    /// Cameras assigned to the project
    pub total_cameras: i64,
}

/// A highlight for the "notable detections" report section
#[derive(Debug, Clone)]
pub struct NotableDetection {
    pub species: String,
    pub confidence: f64,
    pub camera_name: String,
    pub captured_at: DateTime<Utc>,
    pub image_uuid: Uuid,
}

impl Database {
    /// Species observations of a project within a period, ready for
    /// independence grouping.
    ///
    /// Two queries mirror the two sources: curator counts for verified
    /// images, one count per classification for unverified images above the
    /// project detection threshold.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn fetch_observations(
        &self,
        project_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>> {
        let verified = self
            .client()
            .query(
                "SELECT i.camera_id, ho.species, i.captured_at, ho.count \
                 FROM human_observations ho \
                 JOIN images i ON ho.image_id = i.id \
                 JOIN cameras c ON i.camera_id = c.id \
                 WHERE i.is_verified AND c.project_id = $1 \
                   AND i.captured_at BETWEEN $2 AND $3",
                &[&project_id, &start, &end],
            )
            .await?;

        let unverified = self
            .client()
            .query(
                "SELECT i.camera_id, cl.species, i.captured_at, 1::int AS count \
                 FROM classifications cl \
                 JOIN detections d ON cl.detection_id = d.id \
                 JOIN images i ON d.image_id = i.id \
                 JOIN cameras c ON i.camera_id = c.id \
                 JOIN projects p ON c.project_id = p.id \
                 WHERE NOT i.is_verified AND c.project_id = $1 \
                   AND d.confidence >= p.detection_threshold \
                   AND i.captured_at BETWEEN $2 AND $3",
                &[&project_id, &start, &end],
            )
            .await?;

        let mut observations = Vec::with_capacity(verified.len() + unverified.len());
        for row in verified.iter().chain(unverified.iter()) {
            let count: i32 = row.try_get("count")?;
            observations.push(Observation {
                camera_id: row.try_get("camera_id")?,
                species: row.try_get("species")?,
                captured_at: row.try_get("captured_at")?,
                count: i64::from(count),
            });
        }
        Ok(observations)
    }

    /// Headline numbers for a project and period
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn overview_stats(
        &self,
        project_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<OverviewStats> {
        let row = self
            .client()
            .query_one(
                "SELECT \
                     (SELECT COUNT(*) FROM images i JOIN cameras c ON i.camera_id = c.id \
                      WHERE c.project_id = $1) AS total_images, \
                     (SELECT COUNT(*) FROM images i JOIN cameras c ON i.camera_id = c.id \
                      WHERE c.project_id = $1 AND i.captured_at BETWEEN $2 AND $3) AS new_images, \
                     (SELECT COUNT(*) FROM cameras WHERE project_id = $1) AS total_cameras",
                &[&project_id, &start, &end],
            )
            .await?;
        Ok(OverviewStats {
            total_images: row.try_get("total_images")?,
            new_images: row.try_get("new_images")?,
            total_cameras: row.try_get("total_cameras")?,
        })
    }

    /// Highest-confidence classifications within the period, above the
    /// project threshold, for the report's highlight section.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn notable_detections(
        &self,
        project_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<NotableDetection>> {
        let rows = self
            .client()
            .query(
                "SELECT cl.species, cl.confidence, c.name AS camera_name, \
                        i.captured_at, i.uuid \
                 FROM classifications cl \
                 JOIN detections d ON cl.detection_id = d.id \
                 JOIN images i ON d.image_id = i.id \
                 JOIN cameras c ON i.camera_id = c.id \
                 JOIN projects p ON c.project_id = p.id \
                 WHERE c.project_id = $1 AND i.captured_at BETWEEN $2 AND $3 \
                   AND d.confidence >= p.detection_threshold \
                 ORDER BY cl.confidence DESC LIMIT $4",
                &[&project_id, &start, &end, &limit],
            )
            .await?;
        rows.iter()
            .map(|row| {
                Ok(NotableDetection {
                    species: row.try_get("species")?,
                    confidence: row.try_get("confidence")?,
                    camera_name: row.try_get("camera_name")?,
                    captured_at: row.try_get("captured_at")?,
                    image_uuid: row.try_get("uuid")?,
                })
            })
            .collect()
    }
}
