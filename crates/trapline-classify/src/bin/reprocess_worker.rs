// Binary entry point: startup failures terminate the process with a clear
// error rather than starting in a partial state.
#![allow(clippy::expect_used)]

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use trapline_classify::reprocess::ReprocessWorker;
use trapline_core::{telemetry, Settings};
use trapline_db::Database;
use trapline_queue::{names, JobQueue, Shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("configuration")?;
    telemetry::init(&settings);

    info!(log_level = settings.log_level.as_str(), "reprocess worker starting");

    let db = Arc::new(
        Database::connect(&settings.database_url)
            .await
            .context("connecting to database")?,
    );
    db.init_schema().await.context("ensuring schema")?;

    let input = JobQueue::connect(&settings.redis_url, names::CLASSIFICATION_REPROCESS)
        .await
        .context("connecting to broker")?;

    let shutdown = Shutdown::new();
    shutdown.listen();

    let worker = ReprocessWorker::new(db);
    worker.run(input, shutdown).await;

    info!("reprocess worker stopped");
    Ok(())
}
