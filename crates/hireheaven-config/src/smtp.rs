// ============================================================================
// SMTP Configuration
// ============================================================================

/// SMTP relay configuration for the mail worker.
///
/// Credentials are optional so local relays (maildev, mailpit) work without
/// auth; the default port 465 means implicit TLS against a real provider.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    /// SMTP relay hostname
    pub host: String,
    /// SMTP relay port (465 = implicit TLS)
    pub port: u16,
    /// SMTP username (omit for unauthenticated relays)
    pub username: Option<String>,
    /// SMTP password
    pub password: Option<String>,
    /// From header for outgoing mail, display-name form allowed
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 465,
            username: None,
            password: None,
            from: "Hireheaven <no-reply@hireheaven.io>".to_string(),
        }
    }
}

impl SmtpConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "465".to_string())
                .parse()
                .unwrap_or(465),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            from: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| "Hireheaven <no-reply@hireheaven.io>".to_string()),
        }
    }
}
