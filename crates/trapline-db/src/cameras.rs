//! Camera repository
//!
//! Cameras are auto-created by ingestion the first time a serial or name is
//! seen. Health columns are refreshed from daily reports, and the status enum
//! is re-derived on every report: `never_reported` until the first one,
//! `active` while reports are at most 7 days old, `inactive` after.

use crate::{Database, Error, Result};
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use trapline_core::model::{Camera, CameraHealth, CameraStatus, GeoPoint};

/// Days without a daily report before an `active` camera turns `inactive`
pub const ACTIVE_WINDOW_DAYS: i64 = 7;

const CAMERA_COLUMNS: &str = "id, name, serial_number, imei, manufacturer, model, project_id, \
     status, latitude, longitude, battery_percent, sd_used_mb, sd_total_mb, temperature_c, \
     signal_quality, last_seen, last_daily_report_at, last_image_at, config, created_at";

pub(crate) fn camera_from_row(row: &Row) -> Result<Camera> {
    let status: String = row.try_get("status")?;
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    Ok(Camera {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        serial_number: row.try_get("serial_number")?,
        imei: row.try_get("imei")?,
        manufacturer: row.try_get("manufacturer")?,
        model: row.try_get("model")?,
        project_id: row.try_get("project_id")?,
        status: status.parse()?,
        location: match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        },
        battery_percent: row.try_get("battery_percent")?,
        sd_used_mb: row.try_get("sd_used_mb")?,
        sd_total_mb: row.try_get("sd_total_mb")?,
        temperature_c: row.try_get("temperature_c")?,
        signal_quality: row.try_get("signal_quality")?,
        last_seen: row.try_get("last_seen")?,
        last_daily_report_at: row.try_get("last_daily_report_at")?,
        last_image_at: row.try_get("last_image_at")?,
        config: row.try_get("config")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Derive the report-driven status at `now`
pub fn derive_status(last_daily_report_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CameraStatus {
    match last_daily_report_at {
        None => CameraStatus::NeverReported,
        Some(at) if (now - at).num_days() < ACTIVE_WINDOW_DAYS => CameraStatus::Active,
        Some(_) => CameraStatus::Inactive,
    }
}

impl Database {
    /// Fetch a camera by database id.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such camera exists.
    pub async fn get_camera(&self, camera_id: i32) -> Result<Camera> {
        let row = self
            .client()
            .query_opt(
                &format!("SELECT {CAMERA_COLUMNS} FROM cameras WHERE id = $1"),
                &[&camera_id],
            )
            .await?
            .ok_or_else(|| Error::not_found("camera", camera_id))?;
        camera_from_row(&row)
    }

    /// Fetch a camera by serial number
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn get_camera_by_serial(&self, serial_number: &str) -> Result<Option<Camera>> {
        let row = self
            .client()
            .query_opt(
                &format!("SELECT {CAMERA_COLUMNS} FROM cameras WHERE serial_number = $1"),
                &[&serial_number],
            )
            .await?;
        row.as_ref().map(camera_from_row).transpose()
    }

    /// Fetch a camera by name
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn get_camera_by_name(&self, name: &str) -> Result<Option<Camera>> {
        let row = self
            .client()
            .query_opt(
                &format!("SELECT {CAMERA_COLUMNS} FROM cameras WHERE name = $1"),
                &[&name],
            )
            .await?;
        row.as_ref().map(camera_from_row).transpose()
    }

    /// Get the camera matching the resolved identifier, creating it on first
    /// sight. Lookup is by serial number when one is known, by name
    /// otherwise.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn get_or_create_camera(
        &self,
        name: &str,
        serial_number: Option<&str>,
        manufacturer: Option<&str>,
        model: Option<&str>,
        profile_name: &str,
    ) -> Result<Camera> {
        let existing = match serial_number {
            Some(serial) => self.get_camera_by_serial(serial).await?,
            None => self.get_camera_by_name(name).await?,
        };
        if let Some(camera) = existing {
            return Ok(camera);
        }

        let config = serde_json::json!({ "profile": profile_name });
        let row = self
            .client()
            .query_one(
                &format!(
                    "INSERT INTO cameras (name, serial_number, manufacturer, model, status, config) \
                     VALUES ($1, $2, $3, $4, 'never_reported', $5) \
                     RETURNING {CAMERA_COLUMNS}"
                ),
                &[&name, &serial_number, &manufacturer, &model, &config],
            )
            .await?;
        let camera = camera_from_row(&row)?;
        tracing::info!(
            camera_id = camera.id,
            name,
            serial_number,
            profile = profile_name,
            "auto-created camera"
        );
        Ok(camera)
    }

    /// Apply a daily-report health snapshot: health columns, config blob,
    /// `last_daily_report_at`, `last_seen`, and the derived status. Creates
    /// the camera if the report arrived before any image did.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn update_camera_health(&self, identifier: &str, health: &CameraHealth) -> Result<Camera> {
        let camera = match self.get_camera_by_serial(identifier).await? {
            Some(camera) => camera,
            None => {
                self.get_or_create_camera(identifier, Some(identifier), None, None, "daily-report")
                    .await?
            }
        };

        let now = Utc::now();
        let report_at = health.report_datetime.unwrap_or(now);
        let status = derive_status(Some(report_at), now);

        let mut config = camera.config.clone();
        if let Some(map) = config.as_object_mut() {
            map.insert(
                "last_health_report".to_string(),
                serde_json::to_value(health)?,
            );
        }

        let (lat, lon) = match health.gps {
            Some(point) => (Some(point.lat), Some(point.lon)),
            None => (camera.location.map(|p| p.lat), camera.location.map(|p| p.lon)),
        };

        let row = self
            .client()
            .query_one(
                &format!(
                    "UPDATE cameras SET \
                         battery_percent = $2, temperature_c = $3, signal_quality = $4, \
                         sd_used_mb = $5, sd_total_mb = $6, latitude = $7, longitude = $8, \
                         last_daily_report_at = $9, last_seen = $10, status = $11, config = $12 \
                     WHERE id = $1 RETURNING {CAMERA_COLUMNS}"
                ),
                &[
                    &camera.id,
                    &health.battery_percent,
                    &health.temperature_c,
                    &health.signal_quality,
                    &health.sd_used_mb,
                    &health.sd_total_mb,
                    &lat,
                    &lon,
                    &report_at,
                    &now,
                    &status.as_str(),
                    &config,
                ],
            )
            .await?;
        camera_from_row(&row)
    }

    /// Record that an image arrived from this camera
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn touch_camera_image(&self, camera_id: i32, captured_at: DateTime<Utc>) -> Result<()> {
        self.client()
            .execute(
                "UPDATE cameras SET last_image_at = $2, last_seen = now() WHERE id = $1",
                &[&camera_id, &captured_at],
            )
            .await?;
        Ok(())
    }

    /// Move a camera's configured location (used when GPS fixes relocate it)
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn set_camera_location(&self, camera_id: i32, location: GeoPoint) -> Result<()> {
        self.client()
            .execute(
                "UPDATE cameras SET latitude = $2, longitude = $3 WHERE id = $1",
                &[&camera_id, &location.lat, &location.lon],
            )
            .await?;
        Ok(())
    }

    /// Cameras in a project whose battery is at or below `threshold` percent
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn count_low_battery_cameras(&self, project_id: i32, threshold: i32) -> Result<i64> {
        let row = self
            .client()
            .query_one(
                "SELECT COUNT(*) FROM cameras \
                 WHERE project_id = $1 AND battery_percent IS NOT NULL AND battery_percent <= $2",
                &[&project_id, &threshold],
            )
            .await?;
        Ok(row.get(0))
    }

    /// All cameras in a project
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn list_project_cameras(&self, project_id: i32) -> Result<Vec<Camera>> {
        let rows = self
            .client()
            .query(
                &format!("SELECT {CAMERA_COLUMNS} FROM cameras WHERE project_id = $1 ORDER BY name"),
                &[&project_id],
            )
            .await?;
        rows.iter().map(camera_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_never_reported_without_reports() {
        assert_eq!(derive_status(None, Utc::now()), CameraStatus::NeverReported);
    }

    #[test]
    fn test_status_active_within_window() {
        let now = Utc::now();
        assert_eq!(
            derive_status(Some(now - Duration::days(6)), now),
            CameraStatus::Active
        );
    }

    #[test]
    fn test_status_inactive_after_window() {
        let now = Utc::now();
        assert_eq!(
            derive_status(Some(now - Duration::days(8)), now),
            CameraStatus::Inactive
        );
    }
}
