//! Classification worker loop

use crate::annotate::{Annotation, Annotator, BlurRegion};
use crate::model::Classifier;
use crate::species::MODEL_VERSION;
use crate::{crop, filter, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use trapline_core::messages::{
    ClassificationComplete, DetectionComplete, NotificationEvent, SpeciesDetectionEvent,
};
use trapline_core::model::{DetectionCategory, ImageStatus};
use trapline_db::classifications::NewClassification;
use trapline_db::detections::ClassificationContext;
use trapline_db::Database;
use trapline_queue::{names, JobQueue, Shutdown};
use trapline_storage::{annotated_object_path, buckets, ObjectStore};

/// One classification worker process
pub struct ClassificationWorker {
    db: Arc<Database>,
    store: ObjectStore,
    classifier: Arc<dyn Classifier>,
    annotator: Annotator,
    /// Bound to `classification-complete`; sibling queues derived from it
    output: JobQueue,
}

impl ClassificationWorker {
    pub fn new(
        db: Arc<Database>,
        store: ObjectStore,
        classifier: Arc<dyn Classifier>,
        annotator: Annotator,
        output: JobQueue,
    ) -> Self {
        Self {
            db,
            store,
            classifier,
            annotator,
            output,
        }
    }

    /// Consume `detection-complete` until shutdown
    pub async fn run(&self, input: JobQueue, shutdown: Shutdown) {
        input
            .consume_forever(&shutdown, |message: DetectionComplete| async move {
                self.handle(message).await
            })
            .await;
    }

    /// Process one message, applying the failure policy (mark `failed`,
    /// dead-letter, no automatic retry).
    ///
    /// # Errors
    /// Returns the processing error after the failure policy has been
    /// applied.
    pub async fn handle(&self, message: DetectionComplete) -> Result<()> {
        let image_uuid = message.image_uuid;
        info!(
            image_uuid = %image_uuid,
            num_detections = message.num_detections,
            "processing classification request"
        );

        match self.process(&message).await {
            Ok(outcome) => {
                info!(
                    image_uuid = %image_uuid,
                    num_classifications = outcome.num_classifications,
                    "image processing complete"
                );
                Ok(())
            }
            Err(e) => {
                error!(image_uuid = %image_uuid, error = %e, "classification failed");
                if let Err(status_err) = self
                    .db
                    .update_image_status(image_uuid, ImageStatus::Failed)
                    .await
                {
                    error!(image_uuid = %image_uuid, error = %status_err, "failed to mark image failed");
                }
                let payload = serde_json::to_value(&message).unwrap_or_default();
                if let Err(dlq_err) = self
                    .output
                    .publish_dead_letter(names::DETECTION_COMPLETE, payload, &e.to_string())
                    .await
                {
                    error!(image_uuid = %image_uuid, error = %dlq_err, "dead-letter publish failed");
                }
                Err(e)
            }
        }
    }

    async fn process(&self, message: &DetectionComplete) -> Result<ClassificationComplete> {
        let image_uuid = message.image_uuid;

        self.db
            .update_image_status(image_uuid, ImageStatus::Classifying)
            .await?;

        let context = self.db.classification_context(image_uuid).await?;
        let animal_detections: Vec<_> = context
            .detections
            .iter()
            .filter(|d| d.category == DetectionCategory::Animal)
            .collect();

        if animal_detections.is_empty() {
            info!(image_uuid = %image_uuid, "no animal detections to classify");
            return self.finish(image_uuid, vec![]).await;
        }

        // Stage the raw blob once for all crops.
        let temp = tempfile::Builder::new().suffix(".jpg").tempfile()?;
        self.store
            .download_to_file(buckets::RAW_IMAGES, &context.image.storage_path, temp.path())
            .await?;
        let decoded = image::open(temp.path())?;

        let included = context.included_species.as_deref();
        let mut new_classifications = Vec::with_capacity(animal_detections.len());
        for detection in &animal_detections {
            let square = crop::square_crop(&decoded, detection.bbox.normalized);
            let probabilities = self.classifier.classify(&square)?;
            let Some(top1) = filter::filtered_top1(&probabilities, included) else {
                warn!(detection_id = detection.id, "no usable top-1, skipping detection");
                continue;
            };
            if top1.fallback_used {
                warn!(
                    detection_id = detection.id,
                    species = top1.species.as_str(),
                    "species filter masked every class, stored unfiltered top-1"
                );
            }
            info!(
                detection_id = detection.id,
                species = top1.species.as_str(),
                confidence = format!("{:.4}", top1.confidence).as_str(),
                "classification complete"
            );
            new_classifications.push(NewClassification {
                detection_id: detection.id,
                species: top1.species.clone(),
                confidence: top1.confidence,
                raw_predictions: filter::raw_predictions(&probabilities, &top1.species),
                model_version: Some(MODEL_VERSION.to_string()),
            });
        }

        let classification_ids = self.db.insert_classifications(&new_classifications).await?;

        // Annotated image is best-effort: a rendering failure must not stop
        // the pipeline or the notifications.
        let annotated_path = if new_classifications.is_empty() {
            None
        } else {
            match self.render_and_upload(&context, &decoded, &new_classifications).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(
                        image_uuid = %image_uuid,
                        error = %e,
                        "failed to generate annotated image, notifications will be text-only"
                    );
                    None
                }
            }
        };

        self.publish_species_events(&context, &new_classifications, annotated_path)
            .await;

        self.finish(image_uuid, classification_ids).await
    }

    async fn finish(
        &self,
        image_uuid: uuid::Uuid,
        classification_ids: Vec<i32>,
    ) -> Result<ClassificationComplete> {
        self.db
            .update_image_status(image_uuid, ImageStatus::Classified)
            .await?;
        let outcome = ClassificationComplete {
            image_uuid,
            num_classifications: classification_ids.len() as u32,
            classification_ids,
        };
        self.output.publish(&outcome).await?;
        Ok(outcome)
    }

    async fn render_and_upload(
        &self,
        context: &ClassificationContext,
        decoded: &image::DynamicImage,
        classifications: &[NewClassification],
    ) -> Result<String> {
        // Privacy first: blur people and vehicles above the project
        // threshold before drawing anything on top.
        let blur_regions: Vec<BlurRegion> = if context.blur_people_vehicles {
            context
                .detections
                .iter()
                .filter(|d| {
                    matches!(
                        d.category,
                        DetectionCategory::Person | DetectionCategory::Vehicle
                    ) && d.confidence >= context.detection_threshold
                })
                .map(|d| BlurRegion { bbox: d.bbox.clone() })
                .collect()
        } else {
            Vec::new()
        };

        let by_detection: HashMap<i32, &trapline_core::model::Detection> =
            context.detections.iter().map(|d| (d.id, d)).collect();
        let annotations: Vec<Annotation> = classifications
            .iter()
            .filter_map(|classification| {
                by_detection.get(&classification.detection_id).map(|detection| Annotation {
                    category: detection.category,
                    bbox: detection.bbox.clone(),
                    species: classification.species.clone(),
                    confidence: classification.confidence,
                })
            })
            .collect();

        let bytes = self.annotator.render(decoded, &blur_regions, &annotations)?;
        let path = annotated_object_path(context.image.uuid);
        self.store
            .put_bytes(buckets::THUMBNAILS, &path, bytes)
            .await?;
        info!(
            image_uuid = %context.image.uuid,
            annotated_path = path.as_str(),
            num_annotations = annotations.len(),
            num_blurred = blur_regions.len(),
            "annotated image uploaded"
        );
        Ok(path)
    }

    /// One `notification-events` message per unique species, carrying the
    /// highest-confidence classification of that species
    async fn publish_species_events(
        &self,
        context: &ClassificationContext,
        classifications: &[NewClassification],
        annotated_path: Option<String>,
    ) {
        let Some(project_id) = context.camera.project_id else {
            return;
        };

        let mut best_per_species: HashMap<&str, &NewClassification> = HashMap::new();
        for classification in classifications {
            match best_per_species.get(classification.species.as_str()) {
                Some(existing) if existing.confidence >= classification.confidence => {}
                _ => {
                    best_per_species.insert(classification.species.as_str(), classification);
                }
            }
        }

        let by_detection: HashMap<i32, f64> = context
            .detections
            .iter()
            .map(|d| (d.id, d.confidence))
            .collect();

        // Image GPS wins over the camera's configured location.
        let location = context.image.metadata.gps().or(context.camera.location);
        let timestamp = context
            .image
            .metadata
            .datetime_original
            .clone()
            .unwrap_or_else(|| context.image.captured_at.to_rfc3339());

        let events_queue = self.output.with_queue(names::NOTIFICATION_EVENTS);
        for (species, classification) in best_per_species {
            let event = NotificationEvent::SpeciesDetection(SpeciesDetectionEvent {
                project_id,
                image_uuid: context.image.uuid,
                camera_id: context.camera.id,
                camera_name: context.camera.name.clone(),
                camera_location: location,
                species: species.to_string(),
                confidence: Some(classification.confidence),
                detection_confidence: by_detection.get(&classification.detection_id).copied(),
                detection_count: classifications.len() as u32,
                annotated_minio_path: annotated_path.clone(),
                timestamp: Some(timestamp.clone()),
            });
            if let Err(e) = events_queue.publish(&event).await {
                error!(species, error = %e, "failed to publish notification event");
            } else {
                info!(
                    species,
                    confidence = format!("{:.4}", classification.confidence).as_str(),
                    "published species detection notification"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_per_species_selection() {
        // The fan-out keeps the strongest classification per species; mirror
        // the selection logic on plain data.
        let classifications = [
            ("fox", 0.4, 1),
            ("fox", 0.9, 2),
            ("badger", 0.7, 3),
        ];
        let mut best: HashMap<&str, (f64, i32)> = HashMap::new();
        for (species, confidence, detection_id) in classifications {
            match best.get(species) {
                Some((existing, _)) if *existing >= confidence => {}
                _ => {
                    best.insert(species, (confidence, detection_id));
                }
            }
        }
        assert_eq!(best.len(), 2);
        assert_eq!(best["fox"], (0.9, 2));
        assert_eq!(best["badger"], (0.7, 3));
    }
}
