//! In-process queue with the [`JobQueue`](crate::JobQueue) surface, for tests
//!
//! Keeps the same JSON round trip as the Redis queue so payload schema
//! mistakes fail in unit tests too.

use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{timeout, Duration};

/// FIFO queue backed by a `VecDeque`. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    buffer: Arc<Mutex<VecDeque<String>>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a message onto the tail of the queue.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn publish<T: Serialize>(&self, message: &T) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push_back(payload);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Pop from the head, waiting up to `timeout_secs` for a message.
    /// `0.0` waits indefinitely.
    ///
    /// # Errors
    /// Returns an error if the payload does not decode as `T`.
    pub async fn consume<T: DeserializeOwned>(&self, timeout_secs: f64) -> Result<Option<T>> {
        loop {
            if let Some(payload) = self.pop() {
                return Ok(Some(serde_json::from_str(&payload)?));
            }
            if timeout_secs == 0.0 {
                self.notify.notified().await;
            } else {
                let wait = Duration::from_secs_f64(timeout_secs);
                if timeout(wait, self.notify.notified()).await.is_err() {
                    return Ok(self.pop().map(|p| serde_json::from_str(&p)).transpose()?);
                }
            }
        }
    }

    /// Pop without waiting
    pub fn try_consume<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        Ok(self.pop().map(|p| serde_json::from_str(&p)).transpose()?)
    }

    /// Current queue depth
    pub fn depth(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    fn pop(&self) -> Option<String> {
        self.buffer.lock().ok().and_then(|mut b| b.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestMessage {
        seq: u32,
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryQueue::new();
        for seq in 0..5 {
            queue.publish(&TestMessage { seq }).ok();
        }
        for seq in 0..5 {
            let msg: Option<TestMessage> = queue.try_consume().ok().flatten();
            assert_eq!(msg, Some(TestMessage { seq }));
        }
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_consume_times_out_when_empty() {
        let queue = MemoryQueue::new();
        let msg: Option<TestMessage> = queue.consume(0.05).await.ok().flatten();
        assert!(msg.is_none());
    }

    #[tokio::test]
    async fn test_clones_share_the_buffer() {
        let producer = MemoryQueue::new();
        let consumer = producer.clone();
        producer.publish(&TestMessage { seq: 42 }).ok();
        let msg: Option<TestMessage> = consumer.consume(1.0).await.ok().flatten();
        assert_eq!(msg, Some(TestMessage { seq: 42 }));
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_publish() {
        let queue = MemoryQueue::new();
        let consumer = queue.clone();
        let handle =
            tokio::spawn(async move { consumer.consume::<TestMessage>(5.0).await.ok().flatten() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.publish(&TestMessage { seq: 7 }).ok();
        let msg = handle.await.ok().flatten();
        assert_eq!(msg, Some(TestMessage { seq: 7 }));
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_an_error() {
        let queue = MemoryQueue::new();
        queue.publish(&"just a string").ok();
        let result: Result<Option<TestMessage>> = queue.try_consume();
        assert!(result.is_err());
    }
}
