use std::time::Duration;

use hireheaven_config::{KafkaConfig, RetryConfig};
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::error::KafkaError;
use tracing::{info, warn};

use crate::error::ConnectError;

/// Creates a new `rdkafka::config::ClientConfig` from the application's `KafkaConfig`.
///
/// This function centralizes the client configuration so producers, consumers
/// and admin clients are set up consistently.
///
/// It handles:
/// - Bootstrap servers and the logical client id.
/// - Enabling SSL/TLS if `ssl_enabled` is true.
/// - SASL authentication if a mechanism and credentials are provided.
/// - Suppressing librdkafka's informational log noise (`driver_log_level`).
pub fn create_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", &config.client_id)
        .set_log_level(driver_log_level(&config.driver_log_level));

    // Default to plaintext if SSL is not explicitly enabled and no SASL.
    client_config.set("security.protocol", "plaintext");

    if config.ssl_enabled {
        info!("Enabling SSL/TLS for Kafka connection");
        client_config.set("security.protocol", "ssl");
    }

    // Configure SASL if a mechanism is provided
    if let (Some(mechanism), Some(username), Some(password)) = (
        &config.sasl_mechanism,
        &config.sasl_username,
        &config.sasl_password,
    ) {
        info!(sasl_mechanism = %mechanism, "Configuring SASL authentication");
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password);

        if config.ssl_enabled {
            client_config.set("security.protocol", "sasl_ssl");
        } else {
            client_config.set("security.protocol", "sasl_plaintext");
        }
    }

    client_config
}

fn driver_log_level(level: &str) -> RDKafkaLogLevel {
    match level.to_ascii_lowercase().as_str() {
        "debug" => RDKafkaLogLevel::Debug,
        "info" => RDKafkaLogLevel::Info,
        "notice" => RDKafkaLogLevel::Notice,
        "warning" | "warn" => RDKafkaLogLevel::Warning,
        _ => RDKafkaLogLevel::Error,
    }
}

/// Probe the broker until it answers, with exponential backoff.
///
/// rdkafka handles are lazy: `create()` succeeds with no broker running, so a
/// "connect" is only real once a metadata request has been answered. The
/// probe closure performs that request; it is retried up to
/// `retry.max_attempts` times with the backoff doubling from
/// `initial_backoff_ms` and capped at `max_backoff_ms`. The successful
/// probe's value is returned, so callers needing the metadata (the topic
/// provisioner) get it from the same request that proved reachability.
///
/// An already-verified handle never needs re-probing: callers run this once
/// at startup and keep the connection for the life of the process.
pub(crate) async fn await_broker<F, T>(
    retry: &RetryConfig,
    mut probe: F,
) -> Result<T, ConnectError>
where
    F: FnMut() -> Result<T, KafkaError>,
{
    let mut attempt: u32 = 1;
    loop {
        match probe() {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt = attempt, "Broker reachable after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= retry.max_attempts {
                    return Err(ConnectError::Unreachable {
                        attempts: attempt,
                        source: e,
                    });
                }

                let delay = backoff_delay(retry, attempt);
                warn!(
                    attempt = attempt,
                    max_attempts = retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Broker not reachable, will retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let backoff_ms = retry
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
        .min(retry.max_backoff_ms);
    Duration::from_millis(backoff_ms)
}
