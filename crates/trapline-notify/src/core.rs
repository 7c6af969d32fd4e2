//! The notification core: event intake and channel fan-out

use crate::{render, rules, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use trapline_core::messages::{
    EmailDelivery, NotificationEvent, SignalDelivery, TelegramDelivery,
};
use trapline_core::model::Channel;
use trapline_db::Database;
use trapline_queue::{names, JobQueue, Shutdown};

/// Notification core service state
pub struct NotificationCore {
    db: Arc<Database>,
    /// Bound to any queue on the shared broker; channel queues derived
    queues: JobQueue,
    /// Domain for deep links
    domain: String,
}

impl NotificationCore {
    pub fn new(db: Arc<Database>, queues: JobQueue, domain: String) -> Self {
        Self { db, queues, domain }
    }

    pub(crate) fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub(crate) fn queues(&self) -> &JobQueue {
        &self.queues
    }

    pub(crate) fn domain(&self) -> &str {
        &self.domain
    }

    /// Consume `notification-events` until shutdown
    pub async fn run(&self, input: JobQueue, shutdown: Shutdown) {
        input
            .consume_forever(&shutdown, |event: NotificationEvent| async move {
                self.handle_event(event).await
            })
            .await;
    }

    /// Evaluate one event and enqueue the resulting deliveries.
    ///
    /// # Errors
    /// Returns store/broker errors; the bus redelivers the event.
    pub async fn handle_event(&self, event: NotificationEvent) -> Result<()> {
        let project_id = match &event {
            NotificationEvent::SpeciesDetection(e) => e.project_id,
            NotificationEvent::SystemHealth(e) => e.project_id,
            NotificationEvent::LowBattery(_) => {
                // Replaced by the scheduled digest; drain silently.
                return Ok(());
            }
        };

        let project = self.db.get_project(project_id).await?;
        let recipients = self.db.eligible_recipients(project_id).await?;
        let matches =
            rules::matching_deliveries(&event, &recipients, project.detection_threshold);
        if matches.is_empty() {
            return Ok(());
        }

        let trigger_data = serde_json::to_value(&event).unwrap_or_default();
        let (notification_type, message, attachment, keyboard) = match &event {
            NotificationEvent::SpeciesDetection(e) => (
                "species_detection",
                render::species_detection_message(e, &project.name),
                e.annotated_minio_path.clone(),
                Some(render::species_keyboard(
                    e.camera_location,
                    &render::project_images_url(&self.domain, project_id),
                )),
            ),
            NotificationEvent::SystemHealth(e) => {
                ("system_health", render::system_health_message(e), None, None)
            }
            NotificationEvent::LowBattery(_) => return Ok(()),
        };

        info!(
            notification_type,
            project_id,
            matches = matches.len(),
            "fanning out notification"
        );

        for delivery in matches {
            if let Err(e) = self
                .enqueue_delivery(
                    delivery.recipient,
                    delivery.channel,
                    notification_type,
                    &message,
                    &trigger_data,
                    attachment.as_deref(),
                    keyboard.clone(),
                )
                .await
            {
                // One bad recipient must not stall the rest of the fan-out.
                error!(
                    user_id = delivery.recipient.preference.user_id,
                    channel = delivery.channel.as_str(),
                    error = %e,
                    "failed to enqueue delivery"
                );
            }
        }
        Ok(())
    }

    /// Create the pending log row and push the channel payload
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn enqueue_delivery(
        &self,
        recipient: &trapline_db::notifications::Recipient,
        channel: Channel,
        notification_type: &str,
        message: &str,
        trigger_data: &serde_json::Value,
        attachment: Option<&str>,
        keyboard: Option<serde_json::Value>,
    ) -> Result<()> {
        let pref = &recipient.preference;
        let log_id = self
            .db
            .create_notification_log(pref.user_id, notification_type, channel, trigger_data, message)
            .await?;

        match channel {
            Channel::Telegram => {
                let Some(chat_id) = pref.telegram_chat_id.clone() else {
                    warn!(log_id, "telegram delivery without chat id, skipped");
                    return Ok(());
                };
                self.queues
                    .with_queue(names::NOTIFICATION_TELEGRAM)
                    .publish(&TelegramDelivery {
                        notification_log_id: log_id,
                        chat_id,
                        message_text: message.to_string(),
                        attachment_url: attachment.map(str::to_string),
                        reply_markup: keyboard,
                    })
                    .await?;
            }
            Channel::Signal => {
                let Some(recipient_phone) = pref.signal_phone.clone() else {
                    warn!(log_id, "signal delivery without phone number, skipped");
                    return Ok(());
                };
                self.queues
                    .with_queue(names::NOTIFICATION_SIGNAL)
                    .publish(&SignalDelivery {
                        notification_log_id: log_id,
                        recipient_phone,
                        message_text: message.to_string(),
                        attachment_url: attachment.map(str::to_string),
                    })
                    .await?;
            }
            Channel::Email => {
                let subject = message
                    .lines()
                    .next()
                    .unwrap_or("Trapline notification")
                    .replace('*', "");
                self.queues
                    .with_queue(names::NOTIFICATION_EMAIL)
                    .publish(&EmailDelivery {
                        notification_log_id: log_id,
                        to_email: recipient.email.clone(),
                        subject,
                        body_text: message.replace('*', ""),
                        body_html: None,
                    })
                    .await?;
            }
        }

        info!(
            log_id,
            user_id = pref.user_id,
            channel = channel.as_str(),
            notification_type,
            "queued notification"
        );
        Ok(())
    }
}
