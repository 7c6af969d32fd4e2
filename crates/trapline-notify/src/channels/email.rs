//! Email channel: SMTP delivery via lettre

use crate::channels::record_outcome;
use crate::{NotifyError, Result};
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use trapline_core::messages::EmailDelivery;
use trapline_db::Database;
use trapline_queue::{JobQueue, Shutdown};

/// SMTP conversation timeout
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP settings resolved at worker startup
#[derive(Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// SMTP client with a pooled async transport
pub struct EmailClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailClient {
    /// Build the transport. Port 465 speaks implicit TLS; anything else
    /// upgrades with STARTTLS.
    ///
    /// # Errors
    /// Returns `NotifyError::Smtp` for unusable settings (bad relay name,
    /// unparseable from address).
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let from = settings
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Smtp(format!("invalid from address: {e}")))?;

        let builder = if settings.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
        }
        .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport, from })
    }

    /// Send one message, multipart when an HTML body is present.
    ///
    /// # Errors
    /// Returns `NotifyError::Smtp` on build or transport failure.
    pub async fn send(
        &self,
        to_email: &str,
        subject: &str,
        body_text: &str,
        body_html: Option<&str>,
    ) -> Result<()> {
        let to = to_email
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Smtp(format!("invalid recipient: {e}")))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject);

        let message = match body_html {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body_text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            ),
            None => builder.body(body_text.to_string()),
        }
        .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        info!(to = to_email, subject, "email sent");
        Ok(())
    }
}

/// Delivery worker loop
pub async fn run_worker(
    db: Arc<Database>,
    client: Arc<EmailClient>,
    input: JobQueue,
    shutdown: Shutdown,
) {
    input
        .consume_forever(&shutdown, |message: EmailDelivery| {
            let db = Arc::clone(&db);
            let client = Arc::clone(&client);
            async move { deliver(&db, &client, message).await }
        })
        .await;
}

async fn deliver(db: &Arc<Database>, client: &EmailClient, message: EmailDelivery) -> Result<()> {
    let log_id = message.notification_log_id;
    debug!(log_id, to = message.to_email.as_str(), "processing email notification");

    let outcome = client
        .send(
            &message.to_email,
            &message.subject,
            &message.body_text,
            message.body_html.as_deref(),
        )
        .await;
    record_outcome(db, log_id, &outcome).await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_from_address_is_rejected() {
        let settings = SmtpSettings {
            server: "smtp.example.org".to_string(),
            port: 587,
            username: "u".to_string(),
            password: "p".to_string(),
            from: "not an address".to_string(),
        };
        assert!(matches!(
            EmailClient::new(&settings),
            Err(NotifyError::Smtp(_))
        ));
    }
}
