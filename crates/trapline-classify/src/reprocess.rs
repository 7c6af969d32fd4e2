//! Classification reprocessing
//!
//! When a project's species list changes, existing top-1 rows may point at
//! now-excluded species. This consumer re-applies the exclusion filter to
//! the stored probability vectors and rewrites the top-1 columns. Inference
//! never re-runs here; vectors are always persisted by the classification
//! worker.

use crate::filter;
use crate::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use trapline_core::messages::ClassificationReprocess;
use trapline_db::Database;
use trapline_queue::{JobQueue, Shutdown};

/// Reprocess worker: one per process
pub struct ReprocessWorker {
    db: Arc<Database>,
}

impl ReprocessWorker {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Consume `classification-reprocess` until shutdown
    pub async fn run(&self, input: JobQueue, shutdown: Shutdown) {
        input
            .consume_forever(&shutdown, |message: ClassificationReprocess| async move {
                self.handle(message).await
            })
            .await;
    }

    /// Re-filter all classifications of one image.
    ///
    /// # Errors
    /// Returns store errors; the message is then redelivered by the bus.
    pub async fn handle(&self, message: ClassificationReprocess) -> Result<()> {
        info!(
            image_uuid = %message.image_uuid,
            project_id = message.project_id,
            num_excluded = message.excluded_species.len(),
            "processing reprocess request"
        );

        let classifications = self
            .db
            .list_classifications_for_image(message.image_uuid)
            .await?;

        let mut updated = 0usize;
        let mut skipped = 0usize;
        for classification in &classifications {
            let Some(predictions) = classification.raw_predictions.as_ref() else {
                warn!(
                    classification_id = classification.id,
                    "classification has no stored predictions, skipping"
                );
                skipped += 1;
                continue;
            };

            match filter::top1_from_stored(predictions, &message.excluded_species) {
                Some((species, confidence)) => {
                    if species != classification.species
                        || (confidence - classification.confidence).abs() > f64::EPSILON
                    {
                        self.db
                            .update_classification_top1(classification.id, &species, confidence)
                            .await?;
                        info!(
                            classification_id = classification.id,
                            old_species = classification.species.as_str(),
                            new_species = species.as_str(),
                            "classification updated"
                        );
                        updated += 1;
                    }
                }
                None => {
                    error!(
                        classification_id = classification.id,
                        "no species remain after exclusion filter, leaving row unchanged"
                    );
                    skipped += 1;
                }
            }
        }

        info!(
            image_uuid = %message.image_uuid,
            updated,
            skipped,
            "reprocessing complete"
        );
        Ok(())
    }
}
