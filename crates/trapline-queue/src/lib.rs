//! Redis-backed durable FIFO queue bus
//!
//! Each pipeline stage and each notification channel owns one named queue.
//! Messages are JSON, pushed with `LPUSH` and popped with `BRPOP`, which gives
//! FIFO order per queue, at-least-once delivery, and durability across broker
//! restarts (Redis persistence). A message is visible to exactly one consumer;
//! a consumer that dies after popping loses the message to redelivery only if
//! the producer retries, which the pipeline tolerates by design.
//!
//! # Example
//!
//! ```rust,ignore
//! use trapline_queue::{JobQueue, names};
//! use trapline_core::messages::ImageIngested;
//!
//! async fn example() -> Result<(), trapline_queue::Error> {
//!     let queue = JobQueue::connect("redis://localhost:6379", names::IMAGE_INGESTED).await?;
//!     if let Some(msg) = queue.consume::<ImageIngested>(5.0).await? {
//!         println!("image {}", msg.image_uuid);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # See Also
//!
//! - [`MemoryQueue`] - in-process queue with the same surface, for tests
//! - [`trapline-core`](https://docs.rs/trapline-core) - message payload types

pub mod memory;
pub mod names;

pub use memory::MemoryQueue;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use trapline_core::messages::DeadLetter;

/// Errors raised by the queue bus
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Redis connection or command failure
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Message could not be encoded or decoded
    #[error("message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, Error>;

/// Poll slice used by [`JobQueue::consume_forever`] so the loop can observe a
/// shutdown request between messages. Seconds.
const CONSUME_POLL_SECS: f64 = 5.0;

/// One named queue on the shared Redis broker
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
    queue: String,
}

impl JobQueue {
    /// Connect to the broker and bind to `queue`.
    ///
    /// # Errors
    /// Returns an error if the Redis URL is invalid or the connection cannot
    /// be established.
    pub async fn connect(redis_url: &str, queue: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!(queue, "queue connected");
        Ok(Self {
            conn,
            queue: queue.to_string(),
        })
    }

    /// Reuse this broker connection for another named queue
    pub fn with_queue(&self, queue: &str) -> Self {
        Self {
            conn: self.conn.clone(),
            queue: queue.to_string(),
        }
    }

    /// Queue name this handle is bound to
    pub fn name(&self) -> &str {
        &self.queue
    }

    /// Push a message onto the tail of the queue.
    ///
    /// # Errors
    /// Returns an error if encoding fails or the broker rejects the push.
    pub async fn publish<T: Serialize>(&self, message: &T) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(&self.queue, payload).await?;
        debug!(queue = %self.queue, "message published");
        Ok(())
    }

    /// Blocking pop from the head of the queue.
    ///
    /// `timeout_secs = 0.0` blocks until a message arrives. Returns `None` on
    /// timeout.
    ///
    /// # Errors
    /// Returns an error on broker failure or if the payload does not decode
    /// as `T`.
    pub async fn consume<T: DeserializeOwned>(&self, timeout_secs: f64) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn.brpop(&self.queue, timeout_secs).await?;
        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Blocking pop returning the raw JSON value, for consumers that must
    /// keep undecodable payloads (dead-lettering).
    ///
    /// # Errors
    /// Returns an error on broker failure or if the payload is not JSON.
    pub async fn consume_raw(&self, timeout_secs: f64) -> Result<Option<serde_json::Value>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn.brpop(&self.queue, timeout_secs).await?;
        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Current queue depth (LLEN)
    ///
    /// # Errors
    /// Returns an error on broker failure.
    pub async fn depth(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(&self.queue).await?)
    }

    /// Record a failed message on the `failed-jobs` dead-letter queue.
    ///
    /// # Errors
    /// Returns an error if the dead-letter push itself fails.
    pub async fn publish_dead_letter(
        &self,
        source_queue: &str,
        payload: serde_json::Value,
        error_text: &str,
    ) -> Result<()> {
        let entry = DeadLetter {
            queue: source_queue.to_string(),
            payload,
            error: error_text.to_string(),
            failed_at: Utc::now(),
        };
        self.with_queue(names::FAILED_JOBS).publish(&entry).await
    }

    /// Consume messages until shutdown is requested.
    ///
    /// Each message is handed to `handler`; a handler error is logged and the
    /// loop continues with the next message (the handler is responsible for
    /// dead-lettering where the stage's failure policy calls for it). Decode
    /// failures are dead-lettered here since no handler can act on them.
    pub async fn consume_forever<T, F, Fut, E>(&self, shutdown: &Shutdown, mut handler: F)
    where
        T: DeserializeOwned,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: std::fmt::Display,
    {
        info!(queue = %self.queue, "worker listening on queue");
        while !shutdown.is_requested() {
            let raw = match self.consume_raw(CONSUME_POLL_SECS).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    error!(queue = %self.queue, error = %err, "queue read failed");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            let message: T = match serde_json::from_value(raw.clone()) {
                Ok(message) => message,
                Err(err) => {
                    warn!(queue = %self.queue, error = %err, "undecodable message dead-lettered");
                    if let Err(dlq_err) = self
                        .publish_dead_letter(&self.queue, raw, &err.to_string())
                        .await
                    {
                        error!(error = %dlq_err, "dead-letter publish failed");
                    }
                    continue;
                }
            };

            if let Err(err) = handler(message).await {
                error!(queue = %self.queue, error = %err, "error processing message");
            }
        }
        info!(queue = %self.queue, "queue consumer stopped");
    }
}

/// Cooperative shutdown flag, set by SIGTERM/ctrl-c.
///
/// Workers finish the message they are processing, then exit before the next
/// pop.
#[derive(Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task that flips the flag on SIGTERM or ctrl-c
    pub fn listen(&self) {
        let requested = Arc::clone(&self.requested);
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown signal received, finishing current message");
            requested.store(true, Ordering::SeqCst);
        });
    }

    /// Request shutdown programmatically (tests, supervisors)
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_redis() {
        let err = Error::Serialization(
            serde_json::from_str::<serde_json::Value>("not json").unwrap_err(),
        );
        assert!(format!("{err}").contains("serialization"));
    }

    #[test]
    fn test_shutdown_flag() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_requested());
        shutdown.request();
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_shutdown_clones_share_state() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        other.request();
        assert!(shutdown.is_requested());
    }
}
