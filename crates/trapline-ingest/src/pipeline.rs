//! The ingestion pipeline: one dropped file in, one image row (or a
//! quarantined file) out

use crate::error::{IngestError, Rejection, Result};
use crate::{exif_data, profiles, reject, report, thumbnail, validate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use trapline_core::messages::ImageIngested;
use trapline_core::model::ImageMetadata;
use trapline_db::images::NewImage;
use trapline_db::Database;
use trapline_queue::JobQueue;
use trapline_storage::{buckets, camera_object_path, ObjectStore};
use uuid::Uuid;

/// Ingestion worker state: one per process
pub struct Ingestor {
    db: Arc<Database>,
    store: ObjectStore,
    queue: JobQueue,
    upload_dir: PathBuf,
}

impl Ingestor {
    pub fn new(db: Arc<Database>, store: ObjectStore, queue: JobQueue, upload_dir: PathBuf) -> Self {
        Self {
            db,
            store,
            queue,
            upload_dir,
        }
    }

    /// Route a dropped file by extension and apply the failure policy:
    /// rejections quarantine the file, infrastructure errors leave it in
    /// place for the next filesystem event.
    pub async fn process_path(&self, path: &Path) {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut extracted_metadata = None;
        let outcome = match extension.as_str() {
            "jpg" | "jpeg" => self.ingest_image(path, &mut extracted_metadata).await,
            "txt" => self.ingest_daily_report(path).await,
            other => Err(Rejection::UnsupportedFileType(format!("extension {other:?}")).into()),
        };

        match outcome {
            Ok(()) => {}
            Err(IngestError::Rejected(rejection)) => {
                if let Err(e) = reject::quarantine(
                    &self.upload_dir,
                    path,
                    &rejection,
                    extracted_metadata.as_ref(),
                ) {
                    error!(filename, error = %e, "failed to quarantine file");
                }
            }
            Err(e) => {
                // Infrastructure failure: keep the file, surface the error.
                error!(filename, error = %e, "ingestion failed, file left for retry");
            }
        }
    }

    async fn ingest_image(&self, path: &Path, extracted: &mut Option<ImageMetadata>) -> Result<()> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info!(filename, "processing image");

        validate::validate_image(path)?;

        let metadata = exif_data::extract_metadata(path)?;
        *extracted = Some(metadata.clone());

        let profile = profiles::identify_profile(&metadata, &filename)?;
        let identity = profile.camera_identity(&metadata, &filename)?;
        let captured_at =
            exif_data::capture_time(&metadata, path, !profile.requires_datetime)?;

        let camera = self
            .db
            .get_or_create_camera(
                &identity.name,
                identity.serial_number.as_deref(),
                metadata.make.as_deref(),
                metadata.model.as_deref(),
                profile.name,
            )
            .await?;

        if self
            .db
            .is_duplicate_image(camera.id, &filename, captured_at)
            .await?
        {
            return Err(Rejection::Duplicate(format!(
                "camera={}, file={filename}, captured_at={captured_at}",
                identity.name
            ))
            .into());
        }

        let image_uuid = Uuid::new_v4();
        let now = chrono::Utc::now();
        let object_path = camera_object_path(camera.storage_identifier(), now, image_uuid, &filename);

        self.store
            .put_file(buckets::RAW_IMAGES, &object_path, path)
            .await?;

        let thumb = thumbnail::generate_thumbnail(path)?;
        self.store
            .put_bytes(buckets::THUMBNAILS, &object_path, thumb)
            .await?;

        let image = self
            .db
            .create_image(&NewImage {
                uuid: image_uuid,
                filename: filename.clone(),
                camera_id: camera.id,
                captured_at,
                storage_path: object_path.clone(),
                thumbnail_path: Some(object_path.clone()),
                metadata: metadata.clone(),
            })
            .await?;

        self.db.touch_camera_image(camera.id, captured_at).await?;
        if let Some(gps) = metadata.gps() {
            self.db
                .record_gps_fix(camera.id, captured_at.date_naive(), gps)
                .await?;
            // Keep the camera's configured location in step with its fixes.
            self.db.set_camera_location(camera.id, gps).await?;
        }

        self.queue
            .publish(&ImageIngested {
                image_uuid,
                storage_path: object_path.clone(),
                camera_id: camera.id,
            })
            .await?;

        info!(
            image_uuid = %image_uuid,
            image_id = image.id,
            camera = identity.name.as_str(),
            storage_path = object_path.as_str(),
            "image ingestion complete"
        );

        delete_source(path);
        Ok(())
    }

    async fn ingest_daily_report(&self, path: &Path) -> Result<()> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info!(filename, "processing daily report");

        validate::validate_daily_report(path)?;

        let content = std::fs::read_to_string(path)
            .map_err(|e| Rejection::ParseFailed(format!("not valid UTF-8: {e}")))?;
        let parsed = report::parse_daily_report(&content)?;

        // Pre-create with the friendly name so legacy cameras keep their
        // human-facing identifier; health update looks the camera up by IMEI.
        let name = parsed
            .friendly_name
            .clone()
            .unwrap_or_else(|| parsed.camera_id.clone());
        self.db
            .get_or_create_camera(&name, Some(&parsed.camera_id), None, None, "daily-report")
            .await?;

        let camera = self
            .db
            .update_camera_health(&parsed.camera_id, &parsed.health)
            .await?;

        info!(
            camera_id = camera.id,
            imei = parsed.camera_id.as_str(),
            battery = parsed.health.battery_percent,
            temperature = parsed.health.temperature_c,
            signal = parsed.health.signal_quality,
            "daily report processed"
        );

        delete_source(path);
        Ok(())
    }
}

/// Remove a fully processed source file. Failure is logged, never raised -
/// the work is already durable.
fn delete_source(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        error!(path = %path.display(), error = %e, "failed to delete source file");
    } else {
        info!(path = %path.display(), "source file deleted");
    }
}
