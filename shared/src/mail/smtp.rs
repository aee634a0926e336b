use anyhow::Context;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use hireheaven_config::SmtpConfig;

use super::handler::MailSender;
use super::message::MailMessage;
use crate::error::HandlerError;

/// SMTP-backed [`MailSender`] over an async lettre transport.
///
/// `relay()` wraps the connection in implicit TLS, matching the default
/// port 465. Connections are pooled inside the transport, so one mailer
/// serves the whole worker.
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid SMTP_FROM mailbox '{}'", config.from))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .with_context(|| format!("invalid SMTP relay host '{}'", config.host))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(host = %config.host, port = config.port, "SMTP mailer ready");

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), HandlerError> {
        // An unparseable recipient can never be delivered, retrying is useless.
        let to: Mailbox = message.to.parse().map_err(|e| {
            HandlerError::Malformed(format!("invalid recipient address '{}': {}", message.to, e))
        })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| HandlerError::Malformed(format!("failed to build email: {e}")))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| HandlerError::Delivery(e.to_string()))?;

        debug!(subject = %message.subject, "Email accepted by SMTP relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_with_valid_config() {
        let config = SmtpConfig {
            host: "smtp.gmail.com".to_string(),
            port: 465,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            from: "Hireheaven <no-reply@hireheaven.io>".to_string(),
        };

        assert!(SmtpMailer::new(&config).is_ok());
    }

    #[test]
    fn test_new_without_credentials() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            ..SmtpConfig::default()
        };

        assert!(SmtpMailer::new(&config).is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_from_mailbox() {
        let config = SmtpConfig {
            from: "not a mailbox".to_string(),
            ..SmtpConfig::default()
        };

        let error = SmtpMailer::new(&config)
            .err()
            .expect("from mailbox must be rejected");
        assert!(error.to_string().contains("SMTP_FROM"));
    }
}
