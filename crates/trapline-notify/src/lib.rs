//! Notification core and channel workers
//!
//! The core consumes `notification-events`, evaluates per-user rules,
//! creates pending delivery logs, and fans out to per-channel queues. Thin
//! channel workers (Telegram, Signal, email) pull from their queue, attempt
//! delivery, and flip the log row to `sent` or `failed`. Scheduled jobs
//! inside the core produce the daily battery digest (12:00 UTC) and the
//! periodic email reports (06:00 UTC daily/weekly/monthly).

pub mod channels;
pub mod core;
pub mod digest;
pub mod render;
pub mod report;
pub mod rules;
pub mod schedule;

pub use crate::core::NotificationCore;

use thiserror::Error;

/// Errors raised by the notification services
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotifyError {
    /// Store failure
    #[error(transparent)]
    Db(#[from] trapline_db::Error),

    /// Broker failure
    #[error(transparent)]
    Queue(#[from] trapline_queue::Error),

    /// Object-store failure (attachments)
    #[error(transparent)]
    Storage(#[from] trapline_storage::Error),

    /// Outbound HTTP failure (Telegram, Signal)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// SMTP failure
    #[error("smtp error: {0}")]
    Smtp(String),

    /// A channel is not configured (no bot token, no registered number)
    #[error("{0} channel not configured")]
    NotConfigured(&'static str),

    /// Template rendering failure
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

/// Result type for notification operations
pub type Result<T> = std::result::Result<T, NotifyError>;
