//! Signal channel: signal-cli-rest-api client and delivery worker

use crate::channels::record_outcome;
use crate::{NotifyError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use trapline_core::messages::SignalDelivery;
use trapline_db::Database;
use trapline_queue::{JobQueue, Shutdown};
use trapline_storage::{buckets, ObjectStore};

/// Outbound HTTP timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a signal-cli-rest-api sidecar
pub struct SignalClient {
    http: reqwest::Client,
    api_url: String,
    /// Registered sender number in E.164 form
    sender: String,
}

impl SignalClient {
    /// Build from the stored registration.
    ///
    /// # Errors
    /// Returns `NotifyError::NotConfigured` until a number is registered.
    pub async fn from_database(db: &Database, api_url: &str) -> Result<Self> {
        let config = db.get_signal_config().await?;
        let sender = match (config.is_registered, config.phone_number) {
            (true, Some(number)) => number,
            _ => return Err(NotifyError::NotConfigured("signal")),
        };
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_url: api_url.trim_end_matches('/').to_string(),
            sender,
        })
    }

    /// Send a message with an optional base64 image attachment.
    ///
    /// # Errors
    /// Returns an error when the REST API rejects the call.
    pub async fn send_message(
        &self,
        recipient: &str,
        message: &str,
        attachment: Option<&[u8]>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "message": message,
            "number": self.sender,
            "recipients": [recipient],
        });
        if let Some(bytes) = attachment {
            body["base64_attachments"] = serde_json::json!([BASE64.encode(bytes)]);
        }

        self.http
            .post(format!("{}/v2/send", self.api_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        info!(
            recipient = mask(recipient),
            has_attachment = attachment.is_some(),
            "signal message sent"
        );
        Ok(())
    }
}

/// Delivery worker loop
pub async fn run_worker(
    db: Arc<Database>,
    store: ObjectStore,
    api_url: String,
    input: JobQueue,
    shutdown: Shutdown,
) {
    input
        .consume_forever(&shutdown, |message: SignalDelivery| {
            let db = Arc::clone(&db);
            let store = store.clone();
            let api_url = api_url.clone();
            async move { deliver(&db, &store, &api_url, message).await }
        })
        .await;
}

async fn deliver(
    db: &Arc<Database>,
    store: &ObjectStore,
    api_url: &str,
    message: SignalDelivery,
) -> Result<()> {
    let log_id = message.notification_log_id;
    debug!(log_id, "processing signal notification");

    let client = match SignalClient::from_database(db, api_url).await {
        Ok(client) => client,
        Err(e) => {
            record_outcome(db, log_id, &Err(NotifyError::NotConfigured("signal"))).await;
            return Err(e);
        }
    };

    let attachment = match &message.attachment_url {
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
            &message.recipient_phone,
            &message.message_text,
            attachment.as_deref(),
        )
        .await;
    record_outcome(db, log_id, &outcome).await;
    outcome
}

fn mask(number: &str) -> String {
    if number.len() > 5 {
        format!("{}***", &number[..5])
    } else {
        number.to_string()
    }
}
