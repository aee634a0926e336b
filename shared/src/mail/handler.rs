use async_trait::async_trait;
use tracing::{debug, info};

use super::message::MailMessage;
use crate::error::HandlerError;
use crate::kafka::consumer::EventHandler;

/// Transport seam between the event handler and a concrete mail provider.
///
/// [`SmtpMailer`](super::smtp::SmtpMailer) is the production implementation;
/// tests substitute recording or failing senders.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), HandlerError>;
}

/// Turns consumed `send-mail` events into outgoing email.
///
/// Decode and validation failures are [`HandlerError::Malformed`]: the event
/// can never succeed, redelivering it would change nothing, and the consumer
/// loop logs and skips it. Provider failures come back as
/// [`HandlerError::Delivery`].
pub struct MailEventHandler<S: MailSender> {
    sender: S,
}

impl<S: MailSender> MailEventHandler<S> {
    pub fn new(sender: S) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl<S: MailSender> EventHandler for MailEventHandler<S> {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let message: MailMessage = serde_json::from_slice(payload)
            .map_err(|e| HandlerError::Malformed(format!("invalid send-mail payload: {e}")))?;

        message
            .validate()
            .map_err(|e| HandlerError::Malformed(e.to_string()))?;

        debug!(subject = %message.subject, "Dispatching mail event");

        self.sender.send(&message).await?;

        info!(to = %message.to, subject = %message.subject, "Notification email sent");
        Ok(())
    }
}
