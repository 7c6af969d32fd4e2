//! Queue names. The set is exhaustive: every stage and channel is listed here.

/// Ingestion worker -> detection worker
pub const IMAGE_INGESTED: &str = "image-ingested";
/// Detection worker -> classification worker
pub const DETECTION_COMPLETE: &str = "detection-complete";
/// Classification worker -> downstream consumers
pub const CLASSIFICATION_COMPLETE: &str = "classification-complete";
/// Top-1 recomputation requests after a project species-list change
pub const CLASSIFICATION_REPROCESS: &str = "classification-reprocess";
/// Classification worker -> notification core
pub const NOTIFICATION_EVENTS: &str = "notification-events";
/// Notification core -> Signal channel worker
pub const NOTIFICATION_SIGNAL: &str = "notification-signal";
/// Notification core -> Telegram channel worker
pub const NOTIFICATION_TELEGRAM: &str = "notification-telegram";
/// Notification core -> email channel worker
pub const NOTIFICATION_EMAIL: &str = "notification-email";
/// Dead-letter queue
pub const FAILED_JOBS: &str = "failed-jobs";
