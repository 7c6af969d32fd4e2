//! Daily battery digest
//!
//! At 12:00 UTC every user with the digest enabled receives, per project,
//! one message per configured channel counting the cameras at or below
//! their battery threshold. Nothing is sent for projects with no low
//! batteries. Per-user failures are isolated: one bad row never stops the
//! sweep.

use crate::core::NotificationCore;
use crate::{render, Result};
use chrono::Utc;
use tracing::{error, info};
use trapline_core::model::Channel;

impl NotificationCore {
    /// Run one digest sweep over all eligible recipients
    pub async fn send_battery_digest(&self) -> Result<()> {
        info!("starting daily battery digest");
        let recipients = self.db().all_eligible_recipients().await?;
        let mut messages_sent = 0usize;

        for recipient in &recipients {
            let pref = &recipient.preference;
            let Some(config) = pref.channels.battery_digest.as_ref() else {
                continue;
            };
            if !config.enabled {
                continue;
            }
            let channels = pref.deliverable_channels(&config.channels);
            if channels.is_empty() {
                continue;
            }

            match self.digest_for(recipient, config.threshold(), &channels).await {
                Ok(sent) => messages_sent += sent,
                Err(e) => {
                    error!(
                        user_id = pref.user_id,
                        project_id = pref.project_id,
                        error = %e,
                        "battery digest failed for user, continuing"
                    );
                }
            }
        }

        info!(
            total_checked = recipients.len(),
            messages_sent, "daily battery digest completed"
        );
        Ok(())
    }

    async fn digest_for(
        &self,
        recipient: &trapline_db::notifications::Recipient,
        threshold: i32,
        channels: &[Channel],
    ) -> Result<usize> {
        let pref = &recipient.preference;
        let low_battery_count = self
            .db()
            .count_low_battery_cameras(pref.project_id, threshold)
            .await?;
        if low_battery_count == 0 {
            return Ok(0);
        }

        let project = self.db().get_project(pref.project_id).await?;
        let message = render::battery_digest_message(&project.name, low_battery_count, threshold);
        let cameras_url = render::project_cameras_url(self.domain(), pref.project_id);
        let keyboard = render::view_keyboard("View details", &cameras_url);
        let trigger_data = serde_json::json!({
            "project_id": pref.project_id,
            "project_name": project.name,
            "camera_count": low_battery_count,
            "threshold": threshold,
            "digest_date": Utc::now().to_rfc3339(),
        });

        let mut sent = 0usize;
        for channel in channels {
            // Signal has no buttons: the link rides in the message body.
            let body = match channel {
                Channel::Signal => format!("{message}\n\nView details: {cameras_url}"),
                _ => message.clone(),
            };
            self.enqueue_delivery(
                recipient,
                *channel,
                "battery_digest",
                &body,
                &trigger_data,
                None,
                Some(keyboard.clone()),
            )
            .await?;
            sent += 1;
        }

        info!(
            user_id = pref.user_id,
            project_id = pref.project_id,
            camera_count = low_battery_count,
            threshold,
            channels = sent,
            "queued battery digest"
        );
        Ok(sent)
    }
}
