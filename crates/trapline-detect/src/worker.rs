//! Detection worker loop

use crate::model::Detector;
use crate::Result;
use image::GenericImageView;
use std::sync::Arc;
use tracing::{error, info};
use trapline_core::messages::{DetectionComplete, ImageIngested};
use trapline_core::model::{BoundingBox, ImageStatus};
use trapline_db::detections::NewDetection;
use trapline_db::Database;
use trapline_queue::{names, JobQueue, Shutdown};
use trapline_storage::{buckets, ObjectStore};

/// One detection worker process
pub struct DetectionWorker {
    db: Arc<Database>,
    store: ObjectStore,
    detector: Arc<dyn Detector>,
    output: JobQueue,
}

impl DetectionWorker {
    pub fn new(
        db: Arc<Database>,
        store: ObjectStore,
        detector: Arc<dyn Detector>,
        output: JobQueue,
    ) -> Self {
        Self {
            db,
            store,
            detector,
            output,
        }
    }

    /// Consume `image-ingested` until shutdown
    pub async fn run(&self, input: JobQueue, shutdown: Shutdown) {
        input
            .consume_forever(&shutdown, |message: ImageIngested| async move {
                self.handle(message).await
            })
            .await;
    }

    /// Process one message. Failures mark the image `failed` and dead-letter
    /// the message; the returned error only reaches the log.
    ///
    /// # Errors
    /// Returns the processing error after the failure policy has been
    /// applied.
    pub async fn handle(&self, message: ImageIngested) -> Result<()> {
        let image_uuid = message.image_uuid;
        info!(image_uuid = %image_uuid, storage_path = message.storage_path.as_str(), "processing image");

        match self.process(&message).await {
            Ok(outcome) => {
                info!(
                    image_uuid = %image_uuid,
                    num_detections = outcome.num_detections,
                    "detection complete"
                );
                Ok(())
            }
            Err(e) => {
                error!(image_uuid = %image_uuid, error = %e, "detection failed");
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
                    .publish_dead_letter(names::IMAGE_INGESTED, payload, &e.to_string())
                    .await
                {
                    error!(image_uuid = %image_uuid, error = %dlq_err, "dead-letter publish failed");
                }
                Err(e)
            }
        }
    }

    async fn process(&self, message: &ImageIngested) -> Result<DetectionComplete> {
        let image_uuid = message.image_uuid;

        self.db
            .update_image_status(image_uuid, ImageStatus::Processing)
            .await?;

        // Stage the blob in a per-message temp file, removed on drop.
        let temp = tempfile::Builder::new().suffix(".jpg").tempfile()?;
        self.store
            .download_to_file(buckets::RAW_IMAGES, &message.storage_path, temp.path())
            .await?;

        let decoded = image::open(temp.path())?;
        let (width, height) = decoded.dimensions();
        self.db
            .set_image_dimensions(image_uuid, width, height)
            .await?;

        let mut raw = self.detector.detect(&decoded)?;
        // Stable order: strongest detections first.
        raw.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let new_detections: Vec<NewDetection> = raw
            .iter()
            .map(|detection| NewDetection {
                category: detection.category,
                bbox: BoundingBox::from_normalized(detection.normalized, width, height),
                confidence: detection.confidence,
            })
            .collect();
        let detection_ids = self.db.insert_detections(image_uuid, &new_detections).await?;

        self.db
            .update_image_status(image_uuid, ImageStatus::Detected)
            .await?;

        let outcome = DetectionComplete {
            image_uuid,
            num_detections: detection_ids.len() as u32,
            detection_ids,
        };
        self.output.publish(&outcome).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawDetection;
    use trapline_core::model::DetectionCategory;

    struct ScriptedDetector {
        detections: Vec<RawDetection>,
    }

    impl Detector for ScriptedDetector {
        fn detect(&self, _image: &image::DynamicImage) -> Result<Vec<RawDetection>> {
            Ok(self.detections.clone())
        }
    }

    #[test]
    fn test_scripted_detector_is_object_safe() {
        let detector: Arc<dyn Detector> = Arc::new(ScriptedDetector {
            detections: vec![RawDetection {
                category: DetectionCategory::Animal,
                normalized: [0.1, 0.2, 0.3, 0.4],
                confidence: 0.9,
            }],
        });
        let image = image::DynamicImage::new_rgb8(4, 4);
        let result = detector.detect(&image).ok();
        assert_eq!(result.map(|d| d.len()), Some(1));
    }

    #[test]
    fn test_pixel_boxes_follow_image_dimensions() {
        let bbox = BoundingBox::from_normalized([0.1, 0.2, 0.3, 0.4], 2000, 1000);
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (200, 200, 600, 400));
    }
}
