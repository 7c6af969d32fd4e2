// Binary entry point: startup failures terminate the process with a clear
// error rather than starting in a partial state.
#![allow(clippy::expect_used)]

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use trapline_core::{config, telemetry, Settings};
use trapline_db::Database;
use trapline_ingest::{reject, Ingestor};
use trapline_queue::{names, JobQueue, Shutdown};
use trapline_storage::ObjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("configuration")?;
    telemetry::init(&settings);

    let upload_dir = PathBuf::from(
        Settings::require(&settings.ftps_upload_dir, config::FTPS_UPLOAD_DIR)
            .context("configuration")?,
    );

    info!(
        upload_dir = %upload_dir.display(),
        log_level = settings.log_level.as_str(),
        "ingestion service starting"
    );

    std::fs::create_dir_all(&upload_dir).context("creating upload directory")?;
    reject::ensure_quarantine_dirs(&upload_dir).context("creating quarantine directories")?;

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
    store.ensure_buckets().await.context("ensuring buckets")?;

    let queue = JobQueue::connect(&settings.redis_url, names::IMAGE_INGESTED)
        .await
        .context("connecting to broker")?;

    let shutdown = Shutdown::new();
    shutdown.listen();

    let ingestor = Arc::new(Ingestor::new(db, store, queue, upload_dir.clone()));
    trapline_ingest::watcher::watch(ingestor, upload_dir, shutdown)
        .await
        .context("watching upload directory")?;

    info!("ingestion service stopped");
    Ok(())
}
