// src/mail.rs

//! SMTP transport seam.
//!
//! Production code uses [`SmtpMailer`] (lettre over the job's relay);
//! tests substitute their own [`Mailer`] that records messages instead
//! of delivering them.

use std::future::Future;
use std::pin::Pin;

use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::errors::{Result, RunJobError};

/// One outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Trait abstracting mail delivery.
pub trait Mailer: Send + Sync {
    fn send(
        &self,
        message: MailMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real SMTP delivery through the configured relay.
///
/// The relay is a plain submission host (the `smtp_relay` variable,
/// default `localhost`); no authentication or TLS is negotiated.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(relay: &str) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(relay).build();
        Self { transport }
    }
}

impl Mailer for SmtpMailer {
    fn send(
        &self,
        message: MailMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let email = build_message(&message)?;
            self.transport
                .send(email)
                .await
                .map_err(|err| RunJobError::Mail(err.to_string()))?;
            Ok(())
        })
    }
}

fn build_message(message: &MailMessage) -> Result<Message> {
    let from: Mailbox = message.from.parse().map_err(|err| {
        RunJobError::Mail(format!("invalid from address '{}': {err}", message.from))
    })?;

    let mut builder = Message::builder().from(from).subject(message.subject.clone());
    for recipient in &message.to {
        let to: Mailbox = recipient.parse().map_err(|err| {
            RunJobError::Mail(format!("invalid recipient address '{recipient}': {err}"))
        })?;
        builder = builder.to(to);
    }

    builder
        .body(message.body.clone())
        .map_err(|err| RunJobError::Mail(err.to_string()))
}
