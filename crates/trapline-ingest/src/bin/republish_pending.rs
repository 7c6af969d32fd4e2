// Operator tool: re-emit `image-ingested` messages for images stuck in
// `pending` (a detection worker crash, a drained queue). At-least-once
// delivery makes re-publishing safe.
#![allow(clippy::expect_used)]

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::info;
use trapline_core::messages::ImageIngested;
use trapline_core::model::ImageStatus;
use trapline_core::{telemetry, Settings};
use trapline_db::Database;
use trapline_queue::{names, JobQueue};

#[derive(Parser)]
#[command(name = "republish-pending")]
#[command(about = "Re-queue images stuck in pending for the detection worker")]
struct Args {
    /// Only republish images older than this many minutes
    #[arg(long, default_value_t = 30)]
    older_than_minutes: i64,

    /// List what would be republished without queueing anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::from_env().context("configuration")?;
    telemetry::init(&settings);

    let db = Database::connect(&settings.database_url)
        .await
        .context("connecting to database")?;
    let queue = JobQueue::connect(&settings.redis_url, names::IMAGE_INGESTED)
        .await
        .context("connecting to broker")?;

    let cutoff = Utc::now() - Duration::minutes(args.older_than_minutes);
    let stuck = db
        .list_images_in_status(ImageStatus::Pending, cutoff)
        .await
        .context("listing pending images")?;

    info!(count = stuck.len(), dry_run = args.dry_run, "found stuck pending images");

    for image in &stuck {
        if args.dry_run {
            info!(image_uuid = %image.uuid, uploaded_at = %image.uploaded_at, "would republish");
            continue;
        }
        queue
            .publish(&ImageIngested {
                image_uuid: image.uuid,
                storage_path: image.storage_path.clone(),
                camera_id: image.camera_id,
            })
            .await
            .with_context(|| format!("republishing {}", image.uuid))?;
        info!(image_uuid = %image.uuid, "republished");
    }

    info!("republish complete");
    Ok(())
}
