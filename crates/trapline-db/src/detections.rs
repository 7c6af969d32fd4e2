//! Detection repository

use crate::{Database, Result};
use tokio_postgres::Row;
use trapline_core::model::{BoundingBox, Detection, DetectionCategory};
use uuid::Uuid;

const DETECTION_COLUMNS: &str = "id, image_id, category, bbox, confidence";

pub(crate) fn detection_from_row(row: &Row) -> Result<Detection> {
    let category: String = row.try_get("category")?;
    let bbox: serde_json::Value = row.try_get("bbox")?;
    Ok(Detection {
        id: row.try_get("id")?,
        image_id: row.try_get("image_id")?,
        category: category.parse()?,
        bbox: serde_json::from_value(bbox)?,
        confidence: row.try_get("confidence")?,
    })
}

/// Fields for a new detection row
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub category: DetectionCategory,
    pub bbox: BoundingBox,
    pub confidence: f64,
}

/// Everything the classification worker needs for one image, fetched in one
/// round trip per table instead of per-row lazy loads: the image, its
/// detections, and the owning project's filter settings (via the camera).
#[derive(Debug, Clone)]
pub struct ClassificationContext {
    pub image: trapline_core::model::Image,
    pub camera: trapline_core::model::Camera,
    /// `None` when the camera is unassigned or the project allows all species
    pub included_species: Option<Vec<String>>,
    pub detection_threshold: f64,
    pub blur_people_vehicles: bool,
    pub detections: Vec<Detection>,
}

impl Database {
    /// Insert detections for an image, returning their ids in input order.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the image does not exist.
    pub async fn insert_detections(
        &self,
        image_uuid: Uuid,
        detections: &[NewDetection],
    ) -> Result<Vec<i32>> {
        let image = self.get_image_by_uuid(image_uuid).await?;
        let mut ids = Vec::with_capacity(detections.len());
        for detection in detections {
            let bbox = serde_json::to_value(&detection.bbox)?;
            let row = self
                .client()
                .query_one(
                    "INSERT INTO detections (image_id, category, bbox, confidence) \
                     VALUES ($1, $2, $3, $4) RETURNING id",
                    &[
                        &image.id,
                        &detection.category.as_str(),
                        &bbox,
                        &detection.confidence,
                    ],
                )
                .await?;
            ids.push(row.get(0));
        }
        tracing::info!(
            image_uuid = %image_uuid,
            num_detections = ids.len(),
            "detections inserted"
        );
        Ok(ids)
    }

    /// All detections of an image, highest confidence first
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn list_detections(&self, image_id: i32) -> Result<Vec<Detection>> {
        let rows = self
            .client()
            .query(
                &format!(
                    "SELECT {DETECTION_COLUMNS} FROM detections \
                     WHERE image_id = $1 ORDER BY confidence DESC, id"
                ),
                &[&image_id],
            )
            .await?;
        rows.iter().map(detection_from_row).collect()
    }

    /// Load the full classification context for an image.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the image or its camera is missing.
    pub async fn classification_context(&self, image_uuid: Uuid) -> Result<ClassificationContext> {
        let image = self.get_image_by_uuid(image_uuid).await?;
        let camera = self.get_camera(image.camera_id).await?;
        let detections = self.list_detections(image.id).await?;

        let (included_species, detection_threshold, blur_people_vehicles) =
            match camera.project_id {
                Some(project_id) => {
                    let project = self.get_project(project_id).await?;
                    (
                        project.species_filter().map(<[String]>::to_vec),
                        project.detection_threshold,
                        project.blur_people_vehicles,
                    )
                }
                None => (None, 0.5, false),
            };

        Ok(ClassificationContext {
            image,
            camera,
            included_species,
            detection_threshold,
            blur_people_vehicles,
            detections,
        })
    }
}
