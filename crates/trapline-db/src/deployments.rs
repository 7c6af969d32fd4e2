//! Camera deployment period repository
//!
//! Periods of one camera are non-overlapping with monotonic start dates;
//! `end_date IS NULL` marks the current deployment. Ingestion calls
//! [`Database::record_gps_fix`] for every image with GPS, which rolls the
//! open period over when the fix is more than 100 m from the period location.

use crate::{Database, Result};
use chrono::NaiveDate;
use tokio_postgres::Row;
use trapline_core::geo;
use trapline_core::model::{DeploymentPeriod, GeoPoint};

const PERIOD_COLUMNS: &str =
    "id, camera_id, deployment_number, latitude, longitude, start_date, end_date";

fn period_from_row(row: &Row) -> Result<DeploymentPeriod> {
    Ok(DeploymentPeriod {
        id: row.try_get("id")?,
        camera_id: row.try_get("camera_id")?,
        deployment_number: row.try_get("deployment_number")?,
        location: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
    })
}

impl Database {
    /// The camera's open deployment period, if any
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn current_deployment(&self, camera_id: i32) -> Result<Option<DeploymentPeriod>> {
        let row = self
            .client()
            .query_opt(
                &format!(
                    "SELECT {PERIOD_COLUMNS} FROM camera_deployment_periods \
                     WHERE camera_id = $1 AND end_date IS NULL \
                     ORDER BY deployment_number DESC LIMIT 1"
                ),
                &[&camera_id],
            )
            .await?;
        row.as_ref().map(period_from_row).transpose()
    }

    /// All deployment periods of a camera in deployment order
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn list_deployments(&self, camera_id: i32) -> Result<Vec<DeploymentPeriod>> {
        let rows = self
            .client()
            .query(
                &format!(
                    "SELECT {PERIOD_COLUMNS} FROM camera_deployment_periods \
                     WHERE camera_id = $1 ORDER BY deployment_number"
                ),
                &[&camera_id],
            )
            .await?;
        rows.iter().map(period_from_row).collect()
    }

    /// Feed one dated GPS fix into deployment tracking.
    ///
    /// Opens the first period on the camera's first fix; closes the open
    /// period and opens a new one when the fix is a relocation (> 100 m).
    /// Returns the period the fix now belongs to.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn record_gps_fix(
        &self,
        camera_id: i32,
        date: NaiveDate,
        location: GeoPoint,
    ) -> Result<DeploymentPeriod> {
        match self.current_deployment(camera_id).await? {
            Some(current) if !geo::is_relocation(current.location, location) => Ok(current),
            Some(current) => {
                // Close the open period the day before the relocation lands.
                let close_on = date.pred_opt().unwrap_or(date);
                self.client()
                    .execute(
                        "UPDATE camera_deployment_periods SET end_date = $2 WHERE id = $1",
                        &[&current.id, &close_on],
                    )
                    .await?;
                tracing::info!(
                    camera_id,
                    deployment_number = current.deployment_number,
                    distance_m = geo::haversine_distance_m(current.location, location) as i64,
                    "camera relocated, opening new deployment period"
                );
                self.open_deployment(camera_id, current.deployment_number + 1, date, location)
                    .await
            }
            None => self.open_deployment(camera_id, 1, date, location).await,
        }
    }

    /// Dated GPS fixes from stored image metadata, ordered by camera and
    /// capture time. Input to the deployment backfill.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn camera_gps_history(&self) -> Result<Vec<(i32, NaiveDate, GeoPoint)>> {
        let rows = self
            .client()
            .query(
                "SELECT camera_id, captured_at::date AS fix_date, \
                        (image_metadata->'gps_decimal'->0)::float8 AS lat, \
                        (image_metadata->'gps_decimal'->1)::float8 AS lon \
                 FROM images \
                 WHERE image_metadata ? 'gps_decimal' \
                 ORDER BY camera_id, captured_at",
                &[],
            )
            .await?;
        let mut fixes = Vec::with_capacity(rows.len());
        for row in &rows {
            let lat: Option<f64> = row.try_get("lat")?;
            let lon: Option<f64> = row.try_get("lon")?;
            let (Some(lat), Some(lon)) = (lat, lon) else {
                continue;
            };
            if lat == 0.0 && lon == 0.0 {
                continue;
            }
            fixes.push((
                row.try_get("camera_id")?,
                row.try_get("fix_date")?,
                GeoPoint::new(lat, lon),
            ));
        }
        Ok(fixes)
    }

    /// Replace a camera's deployment periods with freshly clustered ones.
    /// The final cluster stays open (`end_date = NULL`).
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn replace_deployments(
        &self,
        camera_id: i32,
        clusters: &[trapline_core::geo::DeploymentCluster],
    ) -> Result<usize> {
        self.client()
            .execute(
                "DELETE FROM camera_deployment_periods WHERE camera_id = $1",
                &[&camera_id],
            )
            .await?;
        for (index, cluster) in clusters.iter().enumerate() {
            let end_date = if index + 1 == clusters.len() {
                None
            } else {
                Some(cluster.end_date)
            };
            self.client()
                .execute(
                    "INSERT INTO camera_deployment_periods \
                         (camera_id, deployment_number, latitude, longitude, start_date, end_date) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                    &[
                        &camera_id,
                        &(index as i32 + 1),
                        &cluster.location.lat,
                        &cluster.location.lon,
                        &cluster.start_date,
                        &end_date,
                    ],
                )
                .await?;
        }
        Ok(clusters.len())
    }

    async fn open_deployment(
        &self,
        camera_id: i32,
        deployment_number: i32,
        start_date: NaiveDate,
        location: GeoPoint,
    ) -> Result<DeploymentPeriod> {
        let row = self
            .client()
            .query_one(
                &format!(
                    "INSERT INTO camera_deployment_periods \
                         (camera_id, deployment_number, latitude, longitude, start_date) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING {PERIOD_COLUMNS}"
                ),
                &[
                    &camera_id,
                    &deployment_number,
                    &location.lat,
                    &location.lon,
                    &start_date,
                ],
            )
            .await?;
        period_from_row(&row)
    }
}
