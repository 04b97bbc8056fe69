use anyhow::Context;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::SmtpConfig;

/// Outbound delivery of a student's QR code. Implementations block; callers
/// run them off the async executor.
pub trait QrMailer: Send + Sync {
    fn send_qr(&self, to: &str, png: &[u8]) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    from: String,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Self {
        // plain SMTP, no TLS negotiation
        let mut builder = SmtpTransport::builder_dangerous(&config.host).port(config.port);
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Self {
            from: config.from.clone(),
            transport: builder.build(),
        }
    }
}

impl QrMailer for SmtpMailer {
    fn send_qr(&self, to: &str, png: &[u8]) -> anyhow::Result<()> {
        let message = qr_message(&self.from, to, png)?;
        self.transport
            .send(&message)
            .with_context(|| format!("SMTP delivery to {} failed", to))?;
        Ok(())
    }
}

/// Used when no SMTP relay is configured.
pub struct DisabledMailer;

impl QrMailer for DisabledMailer {
    fn send_qr(&self, to: &str, _png: &[u8]) -> anyhow::Result<()> {
        log::info!("No SMTP relay configured, QR code for {} not sent", to);
        Ok(())
    }
}

pub fn qr_message(from: &str, to: &str, png: &[u8]) -> anyhow::Result<Message> {
    let png_type = ContentType::parse("image/png").context("invalid content type")?;
    Message::builder()
        .from(from.parse::<Mailbox>().context("invalid sender address")?)
        .to(to.parse::<Mailbox>().context("invalid recipient address")?)
        .subject("Votre Code QR")
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(
                    "Bonjour, voici votre code QR".to_string(),
                ))
                .singlepart(Attachment::new("qr_code.png".to_string()).body(png.to_vec(), png_type)),
        )
        .context("could not build QR email")
}
