//! Drop-directory watching
//!
//! notify delivers create events from the FTPS upload directory; each file
//! gets a short settle delay before processing so partially transferred
//! uploads are not read mid-write. A startup sweep picks up files that
//! arrived while the worker was down.

use crate::pipeline::Ingestor;
use crate::DEBOUNCE_MILLIS;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use trapline_queue::Shutdown;

/// Watch `upload_dir` until shutdown. Files are processed one at a time, in
/// arrival order.
///
/// # Errors
/// Returns an error if the watcher cannot be installed on the directory.
pub async fn watch(
    ingestor: Arc<Ingestor>,
    upload_dir: PathBuf,
    shutdown: Shutdown,
) -> notify::Result<()> {
    let (tx, mut rx) = mpsc::channel::<PathBuf>(1024);

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_)) {
                    for path in event.paths {
                        let _ = tx.blocking_send(path);
                    }
                }
            }
            Err(e) => error!(error = %e, "filesystem watch error"),
        }
    })?;
    watcher.watch(&upload_dir, RecursiveMode::NonRecursive)?;
    info!(directory = %upload_dir.display(), "watching for new files");

    sweep_existing(&ingestor, &upload_dir).await;

    while !shutdown.is_requested() {
        let path = tokio::select! {
            received = rx.recv() => match received {
                Some(path) => path,
                None => break,
            },
            () = tokio::time::sleep(Duration::from_secs(1)) => continue,
        };

        if !is_ingestible(&path) {
            continue;
        }
        // Settle delay: FTPS servers create the file before the transfer
        // finishes.
        tokio::time::sleep(Duration::from_millis(DEBOUNCE_MILLIS)).await;
        ingestor.process_path(&path).await;
    }

    info!("watcher stopped");
    Ok(())
}

/// Process files already sitting in the drop directory (worker downtime)
async fn sweep_existing(ingestor: &Ingestor, upload_dir: &Path) {
    let entries = match std::fs::read_dir(upload_dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(error = %e, "cannot read upload directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if is_ingestible(&path) {
            info!(path = %path.display(), "processing file found at startup");
            ingestor.process_path(&path).await;
        }
    }
}

fn is_ingestible(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    // The quarantine subtree lives inside the drop directory; never re-ingest
    // rejected files.
    !path
        .components()
        .any(|component| component.as_os_str() == "rejected")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_subtree_is_not_ingestible() {
        let dir = tempfile::tempdir().unwrap();
        let quarantined = dir.path().join("rejected/duplicate/x.jpg");
        std::fs::create_dir_all(quarantined.parent().unwrap()).unwrap();
        std::fs::write(&quarantined, b"data").unwrap();
        assert!(!is_ingestible(&quarantined));
    }

    #[test]
    fn test_top_level_file_is_ingestible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("E1000159.JPG");
        std::fs::write(&path, b"data").unwrap();
        assert!(is_ingestible(&path));
    }

    #[test]
    fn test_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_ingestible(dir.path()));
    }
}
