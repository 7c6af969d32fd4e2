// Binary entry point: startup failures terminate the process with a clear
// error rather than starting in a partial state.
#![allow(clippy::expect_used)]

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use trapline_core::{config, telemetry, Settings};
use trapline_db::Database;
use trapline_detect::{ensure_model, DetectionWorker, OnnxDetector};
use trapline_queue::{names, JobQueue, Shutdown};
use trapline_storage::ObjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("configuration")?;
    telemetry::init(&settings);

    let model_path = PathBuf::from(
        Settings::require(&settings.detection_model_path, config::DETECTION_MODEL_PATH)
            .context("configuration")?,
    );
    let model_url = Settings::require(&settings.detection_model_url, config::DETECTION_MODEL_URL)
        .context("configuration")?;

    info!(log_level = settings.log_level.as_str(), "detection worker starting");

    ensure_model(&model_path, &model_url)
        .await
        .context("fetching detection model")?;
    let detector = Arc::new(OnnxDetector::load(&model_path).context("loading detection model")?);

    let db = Arc::new(
        Database::connect(&settings.database_url)
            .await
            .context("connecting to database")?,
    );
    db.init_schema().await.context("ensuring schema")?;

    let store = ObjectStore::connect(
        &settings.s3_endpoint,
        &settings.s3_access_key,
        &settings.s3_secret_key,
    );

    let input = JobQueue::connect(&settings.redis_url, names::IMAGE_INGESTED)
        .await
        .context("connecting to broker")?;
    let output = input.with_queue(names::DETECTION_COMPLETE);

    let shutdown = Shutdown::new();
    shutdown.listen();

    let worker = DetectionWorker::new(db, store, detector, output);
    worker.run(input, shutdown).await;

    info!("detection worker stopped");
    Ok(())
}
