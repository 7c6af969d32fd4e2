// Binary entry point: startup failures terminate the process with a clear
// error rather than starting in a partial state.
#![allow(clippy::expect_used)]

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use trapline_core::{telemetry, Settings};
use trapline_db::Database;
use trapline_notify::{schedule, NotificationCore};
use trapline_queue::{names, JobQueue, Shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("configuration")?;
    telemetry::init(&settings);

    info!(log_level = settings.log_level.as_str(), "notification core starting");

    let db = Arc::new(
        Database::connect(&settings.database_url)
            .await
            .context("connecting to database")?,
    );
    db.init_schema().await.context("ensuring schema")?;

    let input = JobQueue::connect(&settings.redis_url, names::NOTIFICATION_EVENTS)
        .await
        .context("connecting to broker")?;

    let shutdown = Shutdown::new();
    shutdown.listen();

    let core = Arc::new(NotificationCore::new(
        db,
        input.clone(),
        settings.domain(),
    ));

    // Scheduled digest/report jobs run alongside the event loop.
    let scheduler = tokio::spawn(schedule::run(Arc::clone(&core), shutdown.clone()));

    core.run(input, shutdown).await;
    let _ = scheduler.await;

    info!("notification core stopped");
    Ok(())
}
