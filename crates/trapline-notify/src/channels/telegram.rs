//! Telegram channel: Bot API client, delivery worker, and the `/start`
//! linking poller
//!
//! The worker consumes `notification-telegram`. A sibling task long-polls
//! `getUpdates` for `/start <token>` messages: a valid token binds the
//! originating chat to the (user, project) that issued it.

use crate::channels::record_outcome;
use crate::{NotifyError, Result};
use reqwest::multipart;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use trapline_core::messages::TelegramDelivery;
use trapline_db::Database;
use trapline_queue::{JobQueue, Shutdown};
use trapline_storage::{buckets, ObjectStore};

/// Outbound HTTP timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Long-poll window for `getUpdates`
const POLL_TIMEOUT_SECS: u64 = 5;
/// Backoff when the bot is not configured yet
const UNCONFIGURED_BACKOFF: Duration = Duration::from_secs(30);

/// Minimal Bot API client
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    /// Build from the stored bot configuration.
    ///
    /// # Errors
    /// Returns `NotifyError::NotConfigured` until an admin has stored a bot
    /// token.
    pub async fn from_database(db: &Database) -> Result<Self> {
        let config = db.get_telegram_config().await?;
        let token = match (config.is_configured, config.bot_token) {
            (true, Some(token)) => token,
            _ => return Err(NotifyError::NotConfigured("telegram")),
        };
        Ok(Self::with_token(&token))
    }

    /// Build directly from a token (tests)
    pub fn with_token(token: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: format!("https://api.telegram.org/bot{token}"),
        }
    }

    /// Send a message, as a photo with caption when attachment bytes are
    /// present.
    ///
    /// # Errors
    /// Returns an error when the Bot API rejects the call.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        photo: Option<Vec<u8>>,
        reply_markup: Option<&Value>,
    ) -> Result<()> {
        let response = match photo {
            Some(bytes) => {
                let mut form = multipart::Form::new()
                    .text("chat_id", chat_id.to_string())
                    .text("caption", text.to_string())
                    .text("parse_mode", "Markdown")
                    .part(
                        "photo",
                        multipart::Part::bytes(bytes).file_name("detection.jpg"),
                    );
                if let Some(markup) = reply_markup {
                    form = form.text("reply_markup", markup.to_string());
                }
                self.http
                    .post(format!("{}/sendPhoto", self.base_url))
                    .multipart(form)
                    .send()
                    .await?
            }
            None => {
                let mut body = serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "Markdown",
                });
                if let Some(markup) = reply_markup {
                    body["reply_markup"] = markup.clone();
                }
                self.http
                    .post(format!("{}/sendMessage", self.base_url))
                    .json(&body)
                    .send()
                    .await?
            }
        };
        response.error_for_status()?;
        info!(chat_id = mask(chat_id), "telegram message sent");
        Ok(())
    }

    /// Plain reply without Markdown, used by the linking poller
    pub async fn send_reply(&self, chat_id: &str, text: &str) -> Result<()> {
        self.http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Long-poll for updates
    ///
    /// # Errors
    /// Returns transport errors; the poller backs off and retries.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Value>> {
        let mut body = serde_json::json!({
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = offset.into();
        }
        let response: Value = self
            .http
            .post(format!("{}/getUpdates", self.base_url))
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 5))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response["ok"].as_bool() != Some(true) {
            warn!(description = ?response["description"], "getUpdates returned not-ok");
            return Ok(Vec::new());
        }
        Ok(response["result"].as_array().cloned().unwrap_or_default())
    }
}

/// Delivery worker loop
pub async fn run_worker(
    db: Arc<Database>,
    store: ObjectStore,
    input: JobQueue,
    shutdown: Shutdown,
) {
    input
        .consume_forever(&shutdown, |message: TelegramDelivery| {
            let db = Arc::clone(&db);
            let store = store.clone();
            async move { deliver(&db, &store, message).await }
        })
        .await;
}

async fn deliver(db: &Arc<Database>, store: &ObjectStore, message: TelegramDelivery) -> Result<()> {
    let log_id = message.notification_log_id;
    debug!(log_id, chat_id = mask(&message.chat_id), "processing telegram notification");

    let client = match TelegramClient::from_database(db).await {
        Ok(client) => client,
        Err(e) => {
            record_outcome(db, log_id, &Err(NotifyError::NotConfigured("telegram"))).await;
            return Err(e);
        }
    };

    // Attachment is best-effort: a missing blob downgrades to text.
    let photo = match &message.attachment_url {
        Some(path) => match store.get_bytes(buckets::THUMBNAILS, path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(log_id, path, error = %e, "attachment fetch failed, sending text-only");
                None
            }
        },
        None => None,
    };

    let outcome = client
        .send_message(
            &message.chat_id,
            &message.message_text,
            photo,
            message.reply_markup.as_ref(),
        )
        .await;
    record_outcome(db, log_id, &outcome).await;
    outcome
}

/// `/start` linking poller; runs as a sibling task of the delivery worker
pub async fn run_linking_poller(db: Arc<Database>, domain: String, shutdown: Shutdown) {
    info!("telegram /start poller started");
    let mut offset: Option<i64> = None;

    while !shutdown.is_requested() {
        let client = match TelegramClient::from_database(&db).await {
            Ok(client) => client,
            Err(NotifyError::NotConfigured(_)) => {
                debug!("telegram not configured yet, poller idle");
                tokio::time::sleep(UNCONFIGURED_BACKOFF).await;
                continue;
            }
            Err(e) => {
                error!(error = %e, "telegram config lookup failed");
                tokio::time::sleep(UNCONFIGURED_BACKOFF).await;
                continue;
            }
        };

        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                error!(error = %e, "getUpdates failed");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            if let Some(update_id) = update["update_id"].as_i64() {
                offset = Some(update_id + 1);
            }
            let text = update["message"]["text"].as_str().unwrap_or("");
            let chat_id = match update["message"]["chat"]["id"].as_i64() {
                Some(id) => id.to_string(),
                None => continue,
            };
            if !text.trim().to_lowercase().starts_with("/start") {
                continue;
            }

            let token = text.split_whitespace().nth(1);
            let reply = match token {
                Some(token) => match db.redeem_linking_token(token, &chat_id).await {
                    Ok(Some(linking)) => {
                        info!(
                            user_id = linking.user_id,
                            project_id = linking.project_id,
                            chat_id = mask(&chat_id),
                            "telegram account linked"
                        );
                        "Successfully linked! You'll now receive notifications.\n\n\
                         Go back to the notification settings page to see your status update."
                            .to_string()
                    }
                    Ok(None) => {
                        warn!(chat_id = mask(&chat_id), "invalid or expired linking token");
                        "Invalid or expired linking token.\n\n\
                         Please generate a new link from your project's notification settings."
                            .to_string()
                    }
                    Err(e) => {
                        error!(error = %e, "linking token lookup failed");
                        continue;
                    }
                },
                None => format!(
                    "Welcome! Your chat ID is: {chat_id}\n\n\
                     To link your account, use the setup link from your project's \
                     notification settings at https://{domain}"
                ),
            };

            if let Err(e) = client.send_reply(&chat_id, &reply).await {
                error!(error = %e, "failed to reply to /start");
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    info!("telegram /start poller stopped");
}

/// First few characters only; chat ids are personal data
fn mask(chat_id: &str) -> String {
    if chat_id.len() > 5 {
        format!("{}***", &chat_id[..5])
    } else {
        chat_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_the_tail() {
        assert_eq!(mask("1234567890"), "12345***");
        assert_eq!(mask("123"), "123");
    }
}
