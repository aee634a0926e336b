// ============================================================================
// Hireheaven Config - Centralized configuration management
// ============================================================================
//
// This crate provides configuration for the notification pipeline services.
// Everything loads from environment variables with sensible defaults, so a
// bare `docker compose up` works against local Kafka and a local SMTP relay.
//
// ============================================================================

mod kafka;
mod smtp;
mod worker;

pub use kafka::{KafkaConfig, RetryConfig, SEND_MAIL_TOPIC};
pub use smtp::SmtpConfig;
pub use worker::WorkerConfig;

use anyhow::Result;

/// Main configuration structure for notification pipeline processes
#[derive(Clone, Debug)]
pub struct Config {
    /// Log filter passed to the tracing subscriber (RUST_LOG)
    pub rust_log: String,

    // Sub-configurations
    pub kafka: KafkaConfig,
    pub smtp: SmtpConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            kafka: KafkaConfig::from_env(),
            smtp: SmtpConfig::from_env(),
            worker: WorkerConfig::from_env(),
        })
    }
}
