//! System email service for verification codes and relayed messages.
//!
//! Delivery is handed to the configured SMTP relay; nothing is queued or
//! retried here.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

/// File attached to a relayed email
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Service for sending system emails
pub struct SystemEmailService {
    config: EmailConfig,
}

impl SystemEmailService {
    /// Create a new system email service
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send the account verification code.
    ///
    /// Skipped with a warning when SMTP is not configured, so local setups can
    /// still register (the code is then only visible in the database).
    pub async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                to = %to_email,
                "Email not configured, skipping verification email"
            );
            return Ok(());
        }

        let message = self
            .builder(to_email)?
            .subject("Email Verification Code")
            .header(ContentType::TEXT_PLAIN)
            .body(render_verification_text(code))?;

        self.deliver(message, to_email).await
    }

    /// Relay an arbitrary plain-text email, optionally with one attachment
    pub async fn send_relay(
        &self,
        to_email: &str,
        subject: &str,
        body: &str,
        attachment: Option<EmailAttachment>,
    ) -> Result<()> {
        if !self.is_enabled() {
            anyhow::bail!("SMTP is not configured");
        }

        let builder = self.builder(to_email)?.subject(subject);

        let message = match attachment {
            Some(file) if !file.content.is_empty() => {
                let content_type = ContentType::parse("application/octet-stream")?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_PLAIN)
                                .body(body.to_string()),
                        )
                        .singlepart(Attachment::new(file.filename).body(file.content, content_type)),
                )?
            }
            _ => builder
                .header(ContentType::TEXT_PLAIN)
                .body(body.to_string())?,
        };

        self.deliver(message, to_email).await
    }

    fn builder(&self, to_email: &str) -> Result<lettre::message::MessageBuilder> {
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        // Build the from mailbox with name
        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        Ok(Message::builder().from(from).to(to))
    }

    async fn deliver(&self, email: Message, to_email: &str) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;

        // Build SMTP transport
        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, "Email sent successfully");

        Ok(())
    }
}

fn render_verification_text(code: &str) -> String {
    format!("Your verification code is: {}", code)
}
