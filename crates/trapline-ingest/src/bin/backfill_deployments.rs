// Operator tool: rebuild camera deployment periods from stored image GPS
// history. Run once after enabling deployment tracking, or whenever periods
// need recomputing from scratch.
#![allow(clippy::expect_used)]

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use tracing::info;
use trapline_core::geo::{cluster_deployments, GpsSample};
use trapline_core::{telemetry, Settings};
use trapline_db::Database;

#[derive(Parser)]
#[command(name = "backfill-deployments")]
#[command(about = "Rebuild camera deployment periods from image GPS history")]
struct Args {
    /// Compute and report clusters without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Only process this camera id
    #[arg(long)]
    camera_id: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::from_env().context("configuration")?;
    telemetry::init(&settings);

    let db = Database::connect(&settings.database_url)
        .await
        .context("connecting to database")?;
    db.init_schema().await.context("ensuring schema")?;

    let history = db.camera_gps_history().await.context("loading GPS history")?;
    let mut per_camera: BTreeMap<i32, Vec<GpsSample>> = BTreeMap::new();
    for (camera_id, date, location) in history {
        if args.camera_id.is_some_and(|only| only != camera_id) {
            continue;
        }
        per_camera
            .entry(camera_id)
            .or_default()
            .push(GpsSample { date, location });
    }

    info!(cameras = per_camera.len(), dry_run = args.dry_run, "backfilling deployment periods");

    for (camera_id, samples) in per_camera {
        let clusters = cluster_deployments(&samples);
        info!(
            camera_id,
            samples = samples.len(),
            periods = clusters.len(),
            "clustered deployments"
        );
        if !args.dry_run {
            db.replace_deployments(camera_id, &clusters)
                .await
                .with_context(|| format!("writing periods for camera {camera_id}"))?;
        }
    }

    info!("deployment backfill complete");
    Ok(())
}
