// Binary entry point: startup failures terminate the process with a clear
// error rather than starting in a partial state.
#![allow(clippy::expect_used)]

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use trapline_core::{telemetry, Settings};
use trapline_db::Database;
use trapline_notify::channels::telegram;
use trapline_queue::{names, JobQueue, Shutdown};
use trapline_storage::ObjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("configuration")?;
    telemetry::init(&settings);

    info!(log_level = settings.log_level.as_str(), "telegram worker starting");

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

    let input = JobQueue::connect(&settings.redis_url, names::NOTIFICATION_TELEGRAM)
        .await
        .context("connecting to broker")?;

    let shutdown = Shutdown::new();
    shutdown.listen();

    // /start linking runs as a sibling of the delivery loop.
    let poller = tokio::spawn(telegram::run_linking_poller(
        Arc::clone(&db),
        settings.domain(),
        shutdown.clone(),
    ));

    telegram::run_worker(db, store, input, shutdown).await;
    let _ = poller.await;

    info!("telegram worker stopped");
    Ok(())
}
