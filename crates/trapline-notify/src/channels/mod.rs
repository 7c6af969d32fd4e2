//! Channel workers: thin delivery loops per transport
//!
//! Each worker pulls from its queue, attempts delivery, and flips the
//! notification log row to `sent` or `failed`. Transient transport failures
//! surface as errors and rely on at-least-once redelivery by the bus.

pub mod email;
pub mod signal;
pub mod telegram;

use crate::Result;
use std::sync::Arc;
use tracing::error;
use trapline_core::model::NotificationStatus;
use trapline_db::Database;

/// Flip the log row after a delivery attempt; a status-write failure is
/// logged and swallowed so the delivery outcome is not retried for it.
pub(crate) async fn record_outcome(
    db: &Arc<Database>,
    log_id: i32,
    outcome: &Result<()>,
) {
    let write = match outcome {
        Ok(()) => {
            db.update_notification_status(log_id, NotificationStatus::Sent, None)
                .await
        }
        Err(e) => {
            db.update_notification_status(log_id, NotificationStatus::Failed, Some(&e.to_string()))
                .await
        }
    };
    if let Err(e) = write {
        error!(log_id, error = %e, "failed to update notification status");
    }
}
