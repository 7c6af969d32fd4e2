// Binary entry point: startup failures terminate the process with a clear
// error rather than starting in a partial state.
#![allow(clippy::expect_used)]

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use trapline_classify::annotate::Annotator;
use trapline_classify::{ensure_model, ClassificationWorker, OnnxClassifier};
use trapline_core::{config, telemetry, Settings};
use trapline_db::Database;
use trapline_queue::{names, JobQueue, Shutdown};
use trapline_storage::ObjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("configuration")?;
    telemetry::init(&settings);

    let model_path = PathBuf::from(
        Settings::require(
            &settings.classification_model_path,
            config::CLASSIFICATION_MODEL_PATH,
        )
        .context("configuration")?,
    );
    let model_url = Settings::require(
        &settings.classification_model_url,
        config::CLASSIFICATION_MODEL_URL,
    )
    .context("configuration")?;

    info!(log_level = settings.log_level.as_str(), "classification worker starting");

    ensure_model(&model_path, &model_url)
        .await
        .context("fetching classification model")?;
    let classifier =
        Arc::new(OnnxClassifier::load(&model_path).context("loading classification model")?);

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

    let input = JobQueue::connect(&settings.redis_url, names::DETECTION_COMPLETE)
        .await
        .context("connecting to broker")?;
    let output = input.with_queue(names::CLASSIFICATION_COMPLETE);

    let shutdown = Shutdown::new();
    shutdown.listen();

    let worker = ClassificationWorker::new(
        db,
        store,
        classifier,
        Annotator::from_system_fonts(),
        output,
    );
    worker.run(input, shutdown).await;

    info!("classification worker stopped");
    Ok(())
}
