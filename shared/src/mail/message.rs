use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Wire format of a `send-mail` event.
///
/// Publishers serialize this to UTF-8 JSON; the mail worker decodes it and
/// hands it to the SMTP transport. Field names are part of the contract
/// shared with every publishing service, so they stay exactly `to`,
/// `subject` and `html`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Recipient address, plain (`a@x.com`) or display-name form
    pub to: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
}

impl MailMessage {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
        }
    }

    /// Rejects messages that could never become a deliverable email.
    pub fn validate(&self) -> Result<()> {
        // Check required fields
        if self.to.is_empty() {
            anyhow::bail!("to is required");
        }
        if !self.to.contains('@') {
            anyhow::bail!("to is not an email address: '{}'", self.to);
        }
        if self.subject.is_empty() {
            anyhow::bail!("subject is required");
        }
        if self.html.is_empty() {
            anyhow::bail!("html body is required");
        }

        Ok(())
    }
}
