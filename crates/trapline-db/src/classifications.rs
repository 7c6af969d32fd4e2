//! Classification repository

use crate::{Database, Result};
use std::collections::BTreeMap;
use tokio_postgres::Row;
use trapline_core::model::Classification;
use uuid::Uuid;

const CLASSIFICATION_COLUMNS: &str =
    "id, detection_id, species, confidence, raw_predictions, model_version";

pub(crate) fn classification_from_row(row: &Row) -> Result<Classification> {
    let raw_predictions: Option<serde_json::Value> = row.try_get("raw_predictions")?;
    Ok(Classification {
        id: row.try_get("id")?,
        detection_id: row.try_get("detection_id")?,
        species: row.try_get("species")?,
        confidence: row.try_get("confidence")?,
        raw_predictions: raw_predictions.map(serde_json::from_value).transpose()?,
        model_version: row.try_get("model_version")?,
    })
}

/// Fields for a new classification row
#[derive(Debug, Clone)]
pub struct NewClassification {
    pub detection_id: i32,
    pub species: String,
    pub confidence: f64,
    /// Full probability vector; persisted so reprocessing never re-runs
    /// inference
    pub raw_predictions: BTreeMap<String, f64>,
    pub model_version: Option<String>,
}

impl Database {
    /// Insert classifications, returning their ids in input order.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn insert_classifications(
        &self,
        classifications: &[NewClassification],
    ) -> Result<Vec<i32>> {
        let mut ids = Vec::with_capacity(classifications.len());
        for classification in classifications {
            let raw = serde_json::to_value(&classification.raw_predictions)?;
            let row = self
                .client()
                .query_one(
                    "INSERT INTO classifications \
                         (detection_id, species, confidence, raw_predictions, model_version) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING id",
                    &[
                        &classification.detection_id,
                        &classification.species,
                        &classification.confidence,
                        &raw,
                        &classification.model_version,
                    ],
                )
                .await?;
            ids.push(row.get(0));
        }
        Ok(ids)
    }

    /// All classifications belonging to an image, via its detections
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn list_classifications_for_image(
        &self,
        image_uuid: Uuid,
    ) -> Result<Vec<Classification>> {
        let rows = self
            .client()
            .query(
                &format!(
                    "SELECT c.{} FROM classifications c \
                     JOIN detections d ON c.detection_id = d.id \
                     JOIN images i ON d.image_id = i.id \
                     WHERE i.uuid = $1 ORDER BY c.id",
                    CLASSIFICATION_COLUMNS.replace(", ", ", c.")
                ),
                &[&image_uuid],
            )
            .await?;
        rows.iter().map(classification_from_row).collect()
    }

    /// Rewrite the top-1 of an existing classification (reprocess worker)
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn update_classification_top1(
        &self,
        classification_id: i32,
        species: &str,
        confidence: f64,
    ) -> Result<()> {
        self.client()
            .execute(
                "UPDATE classifications SET species = $2, confidence = $3 WHERE id = $1",
                &[&classification_id, &species, &confidence],
            )
            .await?;
        Ok(())
    }
}
