//! Notification preference, delivery log and channel configuration repository

use crate::users::generate_token;
use crate::{Database, Error, Result};
use chrono::{DateTime, Duration, Utc};
use tokio_postgres::Row;
use trapline_core::model::{
    Channel, NotificationChannels, NotificationLog, NotificationPreference, NotificationStatus,
    SignalConfig, TelegramConfig, TelegramLinkingToken,
};

/// Telegram linking tokens live shorter than invitations
pub const LINKING_TOKEN_TTL_MINUTES: i64 = 30;

const PREFERENCE_COLUMNS: &str =
    "id, user_id, project_id, enabled, telegram_chat_id, signal_phone, notification_channels";
const LOG_COLUMNS: &str = "id, user_id, notification_type, channel, status, trigger_data, \
     message_content, error_message, sent_at, created_at";

/// A preference row joined with the owning user's delivery identity
#[derive(Debug, Clone)]
pub struct Recipient {
    pub preference: NotificationPreference,
    /// Account email; the email channel needs no further contact info
    pub email: String,
    /// Needed by admin-only event kinds (system health)
    pub is_server_admin: bool,
}

fn preference_from_row(row: &Row) -> Result<NotificationPreference> {
    let channels: serde_json::Value = row.try_get("notification_channels")?;
    Ok(NotificationPreference {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        project_id: row.try_get("project_id")?,
        enabled: row.try_get("enabled")?,
        telegram_chat_id: row.try_get("telegram_chat_id")?,
        signal_phone: row.try_get("signal_phone")?,
        channels: serde_json::from_value(channels)?,
    })
}

fn log_from_row(row: &Row) -> Result<NotificationLog> {
    let channel: String = row.try_get("channel")?;
    let status: String = row.try_get("status")?;
    Ok(NotificationLog {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        notification_type: row.try_get("notification_type")?,
        channel: channel.parse()?,
        status: status.parse()?,
        trigger_data: row.try_get("trigger_data")?,
        message_content: row.try_get("message_content")?,
        error_message: row.try_get("error_message")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Database {
    /// Recipients of a project: preference rows whose owning users are
    /// active and verified, joined with the user's email and admin flag.
    /// One join, no per-user lookups; the rule engine filters on the typed
    /// `notification_channels` afterwards.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn eligible_recipients(&self, project_id: i32) -> Result<Vec<Recipient>> {
        let rows = self
            .client()
            .query(
                &format!(
                    "SELECT p.{}, u.email, u.is_server_admin \
                     FROM project_notification_preferences p \
                     JOIN users u ON p.user_id = u.id \
                     WHERE p.project_id = $1 AND u.is_active AND u.is_verified",
                    PREFERENCE_COLUMNS.replace(", ", ", p.")
                ),
                &[&project_id],
            )
            .await?;
        rows.iter().map(recipient_from_row).collect()
    }

    /// Every recipient with an active, verified owner, for the scheduled
    /// digests and reports. Ordered by project so schedulers can group.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn all_eligible_recipients(&self) -> Result<Vec<Recipient>> {
        let rows = self
            .client()
            .query(
                &format!(
                    "SELECT p.{}, u.email, u.is_server_admin \
                     FROM project_notification_preferences p \
                     JOIN users u ON p.user_id = u.id \
                     WHERE u.is_active AND u.is_verified \
                     ORDER BY p.project_id, p.user_id",
                    PREFERENCE_COLUMNS.replace(", ", ", p.")
                ),
                &[],
            )
            .await?;
        rows.iter().map(recipient_from_row).collect()
    }

    /// Upsert the preference row for (user, project)
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn upsert_preference(
        &self,
        user_id: i32,
        project_id: i32,
        enabled: bool,
        channels: &NotificationChannels,
    ) -> Result<NotificationPreference> {
        let channels_json = serde_json::to_value(channels)?;
        let row = self
            .client()
            .query_one(
                &format!(
                    "INSERT INTO project_notification_preferences \
                         (user_id, project_id, enabled, notification_channels) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT ON CONSTRAINT uq_user_project_notification \
                     DO UPDATE SET enabled = EXCLUDED.enabled, \
                                   notification_channels = EXCLUDED.notification_channels, \
                                   updated_at = now() \
                     RETURNING {PREFERENCE_COLUMNS}"
                ),
                &[&user_id, &project_id, &enabled, &channels_json],
            )
            .await?;
        preference_from_row(&row)
    }

    /// Store the Telegram chat id on a preference row, creating the row when
    /// the user linked before configuring anything (notifications stay off
    /// until enabled explicitly).
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn set_telegram_chat_id(
        &self,
        user_id: i32,
        project_id: i32,
        chat_id: &str,
    ) -> Result<()> {
        self.client()
            .execute(
                "INSERT INTO project_notification_preferences \
                     (user_id, project_id, enabled, telegram_chat_id) \
                 VALUES ($1, $2, FALSE, $3) \
                 ON CONFLICT ON CONSTRAINT uq_user_project_notification \
                 DO UPDATE SET telegram_chat_id = EXCLUDED.telegram_chat_id, updated_at = now()",
                &[&user_id, &project_id, &chat_id],
            )
            .await?;
        Ok(())
    }

    /// Create a pending delivery log entry, returning its id.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn create_notification_log(
        &self,
        user_id: i32,
        notification_type: &str,
        channel: Channel,
        trigger_data: &serde_json::Value,
        message_content: &str,
    ) -> Result<i32> {
        let row = self
            .client()
            .query_one(
                "INSERT INTO notification_logs \
                     (user_id, notification_type, channel, status, trigger_data, message_content) \
                 VALUES ($1, $2, $3, 'pending', $4, $5) RETURNING id",
                &[
                    &user_id,
                    &notification_type,
                    &channel.as_str(),
                    trigger_data,
                    &message_content,
                ],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Flip a delivery log to `sent` (stamping `sent_at`) or `failed`
    /// (recording the error).
    ///
    /// # Errors
    /// Returns `Error::NotFound` for an unknown log id.
    pub async fn update_notification_status(
        &self,
        log_id: i32,
        status: NotificationStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let updated = match status {
            NotificationStatus::Sent => {
                self.client()
                    .execute(
                        "UPDATE notification_logs SET status = 'sent', sent_at = now() WHERE id = $1",
                        &[&log_id],
                    )
                    .await?
            }
            _ => {
                self.client()
                    .execute(
                        "UPDATE notification_logs SET status = $2, error_message = $3 WHERE id = $1",
                        &[&log_id, &status.as_str(), &error_message],
                    )
                    .await?
            }
        };
        if updated == 0 {
            return Err(Error::not_found("notification log", log_id));
        }
        Ok(())
    }

    /// Fetch one delivery log row
    ///
    /// # Errors
    /// Returns `Error::NotFound` for an unknown log id.
    pub async fn get_notification_log(&self, log_id: i32) -> Result<NotificationLog> {
        let row = self
            .client()
            .query_opt(
                &format!("SELECT {LOG_COLUMNS} FROM notification_logs WHERE id = $1"),
                &[&log_id],
            )
            .await?
            .ok_or_else(|| Error::not_found("notification log", log_id))?;
        log_from_row(&row)
    }

    /// Singleton Telegram bot credentials
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn get_telegram_config(&self) -> Result<TelegramConfig> {
        let row = self
            .client()
            .query_opt(
                "SELECT bot_token, bot_username, is_configured FROM telegram_config \
                 ORDER BY id LIMIT 1",
                &[],
            )
            .await?;
        Ok(match row {
            Some(row) => TelegramConfig {
                bot_token: row.try_get("bot_token")?,
                bot_username: row.try_get("bot_username")?,
                is_configured: row.try_get("is_configured")?,
            },
            None => TelegramConfig::default(),
        })
    }

    /// Singleton Signal sender registration
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn get_signal_config(&self) -> Result<SignalConfig> {
        let row = self
            .client()
            .query_opt(
                "SELECT phone_number, is_registered FROM signal_config ORDER BY id LIMIT 1",
                &[],
            )
            .await?;
        Ok(match row {
            Some(row) => SignalConfig {
                phone_number: row.try_get("phone_number")?,
                is_registered: row.try_get("is_registered")?,
            },
            None => SignalConfig::default(),
        })
    }

    /// Issue a Telegram linking token for (user, project)
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn create_linking_token(
        &self,
        user_id: i32,
        project_id: i32,
    ) -> Result<TelegramLinkingToken> {
        let token = generate_token();
        let expires_at = Utc::now() + Duration::minutes(LINKING_TOKEN_TTL_MINUTES);
        let row = self
            .client()
            .query_one(
                "INSERT INTO telegram_linking_tokens (token, user_id, project_id, expires_at) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, token, user_id, project_id, expires_at, used",
                &[&token, &user_id, &project_id, &expires_at],
            )
            .await?;
        linking_token_from_row(&row)
    }

    /// Atomically redeem a linking token and bind the chat id. Returns the
    /// token row when it was valid, `None` for unknown/used/expired tokens.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn redeem_linking_token(
        &self,
        token: &str,
        chat_id: &str,
    ) -> Result<Option<TelegramLinkingToken>> {
        let row = self
            .client()
            .query_opt(
                "UPDATE telegram_linking_tokens SET used = TRUE \
                 WHERE token = $1 AND used = FALSE AND expires_at > now() \
                 RETURNING id, token, user_id, project_id, expires_at, used",
                &[&token],
            )
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let linking = linking_token_from_row(&row)?;
        self.set_telegram_chat_id(linking.user_id, linking.project_id, chat_id)
            .await?;
        Ok(Some(linking))
    }

    /// Notification logs stuck in `pending` longer than `older_than`
    /// (operator visibility into dead channel workers)
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn list_stale_pending_logs(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<NotificationLog>> {
        let rows = self
            .client()
            .query(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM notification_logs \
                     WHERE status = 'pending' AND created_at < $1 ORDER BY created_at"
                ),
                &[&older_than],
            )
            .await?;
        rows.iter().map(log_from_row).collect()
    }
}

fn recipient_from_row(row: &Row) -> Result<Recipient> {
    Ok(Recipient {
        preference: preference_from_row(row)?,
        email: row.try_get("email")?,
        is_server_admin: row.try_get("is_server_admin")?,
    })
}

fn linking_token_from_row(row: &Row) -> Result<TelegramLinkingToken> {
    Ok(TelegramLinkingToken {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        user_id: row.try_get("user_id")?,
        project_id: row.try_get("project_id")?,
        expires_at: row.try_get("expires_at")?,
        used: row.try_get("used")?,
    })
}
