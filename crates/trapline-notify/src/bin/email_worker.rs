// Binary entry point: startup failures terminate the process with a clear
// error rather than starting in a partial state.
#![allow(clippy::expect_used)]

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use trapline_core::{config, telemetry, Settings};
use trapline_db::Database;
use trapline_notify::channels::email::{self, EmailClient, SmtpSettings};
use trapline_queue::{names, JobQueue, Shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("configuration")?;
    telemetry::init(&settings);

    let smtp = SmtpSettings {
        server: Settings::require(&settings.smtp_server, config::SMTP_SERVER)
            .context("configuration")?,
        port: settings
            .smtp_port
            .ok_or_else(|| anyhow::anyhow!("required environment variable SMTP_PORT is not set"))?,
        username: Settings::require(&settings.smtp_username, config::SMTP_USERNAME)
            .context("configuration")?,
        password: Settings::require(&settings.smtp_password, config::SMTP_PASSWORD)
            .context("configuration")?,
        from: Settings::require(&settings.smtp_from, config::SMTP_FROM).context("configuration")?,
    };

    info!(log_level = settings.log_level.as_str(), "email worker starting");

    let db = Arc::new(
        Database::connect(&settings.database_url)
            .await
            .context("connecting to database")?,
    );
    db.init_schema().await.context("ensuring schema")?;

    let client = Arc::new(EmailClient::new(&smtp).context("building smtp transport")?);

    let input = JobQueue::connect(&settings.redis_url, names::NOTIFICATION_EMAIL)
        .await
        .context("connecting to broker")?;

    let shutdown = Shutdown::new();
    shutdown.listen();

    email::run_worker(db, client, input, shutdown).await;

    info!("email worker stopped");
    Ok(())
}
