//! Human observation repository
//!
//! Curator-authored ground truth. For a verified image these rows replace AI
//! output in every aggregation path.

use crate::{Database, Result};
use tokio_postgres::Row;
use trapline_core::model::HumanObservation;
use uuid::Uuid;

fn observation_from_row(row: &Row) -> Result<HumanObservation> {
    Ok(HumanObservation {
        id: row.try_get("id")?,
        image_id: row.try_get("image_id")?,
        species: row.try_get("species")?,
        count: row.try_get("count")?,
    })
}

impl Database {
    /// Replace the observations of an image and mark it verified.
    ///
    /// # Errors
    /// Returns `Error::NotFound` for an unknown image; counts below 1 are
    /// rejected by the schema check constraint.
    pub async fn set_human_observations(
        &self,
        image_uuid: Uuid,
        observations: &[(String, i32)],
    ) -> Result<Vec<HumanObservation>> {
        let image = self.get_image_by_uuid(image_uuid).await?;

        self.client()
            .execute("DELETE FROM human_observations WHERE image_id = $1", &[&image.id])
            .await?;

        let mut saved = Vec::with_capacity(observations.len());
        for (species, count) in observations {
            let row = self
                .client()
                .query_one(
                    "INSERT INTO human_observations (image_id, species, count) \
                     VALUES ($1, $2, $3) RETURNING id, image_id, species, count",
                    &[&image.id, species, count],
                )
                .await?;
            saved.push(observation_from_row(&row)?);
        }

        self.set_image_verified(image_uuid, true).await?;
        Ok(saved)
    }

    /// Observations of one image
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn list_human_observations(&self, image_id: i32) -> Result<Vec<HumanObservation>> {
        let rows = self
            .client()
            .query(
                "SELECT id, image_id, species, count FROM human_observations \
                 WHERE image_id = $1 ORDER BY id",
                &[&image_id],
            )
            .await?;
        rows.iter().map(observation_from_row).collect()
    }

    /// Remove all observations and clear the verified flag
    ///
    /// # Errors
    /// Returns `Error::NotFound` for an unknown image.
    pub async fn clear_human_observations(&self, image_uuid: Uuid) -> Result<()> {
        let image = self.get_image_by_uuid(image_uuid).await?;
        self.client()
            .execute("DELETE FROM human_observations WHERE image_id = $1", &[&image.id])
            .await?;
        self.set_image_verified(image_uuid, false).await?;
        Ok(())
    }
}
