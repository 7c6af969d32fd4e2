//! Image repository

use crate::{Database, Error, Result};
use chrono::{DateTime, Duration, Utc};
use tokio_postgres::Row;
use trapline_core::model::{Image, ImageMetadata, ImageStatus};
use uuid::Uuid;

const IMAGE_COLUMNS: &str = "id, uuid, filename, camera_id, captured_at, uploaded_at, \
     storage_path, thumbnail_path, status, image_metadata, is_verified";

pub(crate) fn image_from_row(row: &Row) -> Result<Image> {
    let status: String = row.try_get("status")?;
    let metadata: serde_json::Value = row.try_get("image_metadata")?;
    Ok(Image {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        filename: row.try_get("filename")?,
        camera_id: row.try_get("camera_id")?,
        captured_at: row.try_get("captured_at")?,
        uploaded_at: row.try_get("uploaded_at")?,
        storage_path: row.try_get("storage_path")?,
        thumbnail_path: row.try_get("thumbnail_path")?,
        status: status.parse()?,
        metadata: serde_json::from_value(metadata)?,
        is_verified: row.try_get("is_verified")?,
    })
}

/// Fields for a new image row
#[derive(Debug, Clone)]
pub struct NewImage {
    pub uuid: Uuid,
    pub filename: String,
    pub camera_id: i32,
    pub captured_at: DateTime<Utc>,
    pub storage_path: String,
    pub thumbnail_path: Option<String>,
    pub metadata: ImageMetadata,
}

impl Database {
    /// Insert an image with status `pending`.
    ///
    /// # Errors
    /// Returns an error on query failure, including the unique-constraint
    /// violation when an exact duplicate slips past the ingestion check.
    pub async fn create_image(&self, image: &NewImage) -> Result<Image> {
        let metadata = serde_json::to_value(&image.metadata)?;
        let row = self
            .client()
            .query_one(
                &format!(
                    "INSERT INTO images \
                         (uuid, filename, camera_id, captured_at, storage_path, thumbnail_path, \
                          status, image_metadata) \
                     VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7) \
                     RETURNING {IMAGE_COLUMNS}"
                ),
                &[
                    &image.uuid,
                    &image.filename,
                    &image.camera_id,
                    &image.captured_at,
                    &image.storage_path,
                    &image.thumbnail_path,
                    &metadata,
                ],
            )
            .await?;
        image_from_row(&row)
    }

    /// Fetch an image by UUID.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such image exists.
    pub async fn get_image_by_uuid(&self, uuid: Uuid) -> Result<Image> {
        let row = self
            .client()
            .query_opt(
                &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE uuid = $1"),
                &[&uuid],
            )
            .await?
            .ok_or_else(|| Error::not_found("image", uuid))?;
        image_from_row(&row)
    }

    /// Duplicate check: same camera, same filename, capture time within one
    /// second.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn is_duplicate_image(
        &self,
        camera_id: i32,
        filename: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<bool> {
        let window_start = captured_at - Duration::seconds(1);
        let window_end = captured_at + Duration::seconds(1);
        let row = self
            .client()
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM images \
                     WHERE camera_id = $1 AND filename = $2 \
                       AND captured_at BETWEEN $3 AND $4)",
                &[&camera_id, &filename, &window_start, &window_end],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Advance the processing status.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such image exists.
    pub async fn update_image_status(&self, uuid: Uuid, status: ImageStatus) -> Result<()> {
        let updated = self
            .client()
            .execute(
                "UPDATE images SET status = $2 WHERE uuid = $1",
                &[&uuid, &status.as_str()],
            )
            .await?;
        if updated == 0 {
            return Err(Error::not_found("image", uuid));
        }
        tracing::debug!(image_uuid = %uuid, status = status.as_str(), "image status updated");
        Ok(())
    }

    /// Store pixel dimensions discovered at inference time in the metadata
    /// blob.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such image exists.
    pub async fn set_image_dimensions(&self, uuid: Uuid, width: u32, height: u32) -> Result<()> {
        let updated = self
            .client()
            .execute(
                "UPDATE images SET image_metadata = image_metadata \
                     || jsonb_build_object('width', $2::int, 'height', $3::int) \
                 WHERE uuid = $1",
                &[&uuid, &(width as i32), &(height as i32)],
            )
            .await?;
        if updated == 0 {
            return Err(Error::not_found("image", uuid));
        }
        Ok(())
    }

    /// Mark an image as curator-verified (or revert)
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such image exists.
    pub async fn set_image_verified(&self, uuid: Uuid, verified: bool) -> Result<()> {
        let updated = self
            .client()
            .execute(
                "UPDATE images SET is_verified = $2 WHERE uuid = $1",
                &[&uuid, &verified],
            )
            .await?;
        if updated == 0 {
            return Err(Error::not_found("image", uuid));
        }
        Ok(())
    }

    /// Delete an image row, returning the blob paths the caller must delete
    /// from the object store. Detections and classifications cascade.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such image exists.
    pub async fn delete_image(&self, uuid: Uuid) -> Result<(String, Option<String>)> {
        let row = self
            .client()
            .query_opt(
                "DELETE FROM images WHERE uuid = $1 RETURNING storage_path, thumbnail_path",
                &[&uuid],
            )
            .await?
            .ok_or_else(|| Error::not_found("image", uuid))?;
        Ok((row.try_get(0)?, row.try_get(1)?))
    }

    /// Images stuck in a given status longer than `older_than` (operator
    /// tooling for crashed workers)
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn list_images_in_status(
        &self,
        status: ImageStatus,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Image>> {
        let rows = self
            .client()
            .query(
                &format!(
                    "SELECT {IMAGE_COLUMNS} FROM images \
                     WHERE status = $1 AND uploaded_at < $2 ORDER BY uploaded_at"
                ),
                &[&status.as_str(), &older_than],
            )
            .await?;
        rows.iter().map(image_from_row).collect()
    }
}
