//! Process lifecycle for the publishing side.
//!
//! Request-serving services call [`init_publisher`] once at startup and
//! [`shutdown_publisher`] on the way down. The consuming side has its own
//! lifecycle in the mail worker binary: a consumer without a broker has no
//! reason to keep running, so its failures are fatal rather than degraded.

use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use hireheaven_config::KafkaConfig;

use crate::error::ProvisionError;
use crate::kafka::admin::{ensure_topic, TopicSpec};
use crate::kafka::producer::EventPublisher;

/// Provision the topic and connect the process-wide publisher.
///
/// Startup order: the topic is ensured first, then the producer connects and
/// probes the broker. Failure handling differs by cause, not by phase:
///
/// * Provisioning rejection is fatal - the broker answered and refused the
///   topic, which a retry will not fix.
/// * An unreachable broker degrades - whether it surfaces while provisioning
///   or while connecting, the service keeps serving its own requests and
///   every publish fails fast with `NotInitialized` until restart.
///
/// With Kafka disabled by configuration this skips the broker entirely and
/// returns a disconnected publisher.
pub async fn init_publisher(config: &KafkaConfig) -> anyhow::Result<EventPublisher> {
    if !config.enabled {
        info!("Kafka disabled (KAFKA_ENABLED=false) - publishes will be dropped loudly");
        return Ok(EventPublisher::disconnected());
    }

    let spec = TopicSpec::from_config(config);
    match ensure_topic(config, &spec).await {
        Ok(()) => {}
        Err(e @ ProvisionError::Unreachable { .. }) => {
            error!(
                error = %e,
                "Kafka unreachable at startup - running degraded, notifications disabled"
            );
            return Ok(EventPublisher::disconnected());
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to provision Kafka topic '{}'", spec.name));
        }
    }

    match EventPublisher::connect(config).await {
        Ok(publisher) => Ok(publisher),
        Err(e) => {
            error!(
                error = %e,
                "Kafka unreachable at startup - running degraded, notifications disabled"
            );
            Ok(EventPublisher::disconnected())
        }
    }
}

/// Flush in-flight records before the process exits.
///
/// Records already handed to the driver survive caller cancellation; this
/// gives them `flush_timeout` to reach the broker.
pub async fn shutdown_publisher(
    publisher: &EventPublisher,
    flush_timeout: Duration,
) -> anyhow::Result<()> {
    if !publisher.is_connected() {
        return Ok(());
    }

    if let Err(e) = publisher.flush(flush_timeout).await {
        warn!(error = %e, "Producer flush did not complete cleanly");
        return Err(e);
    }

    info!("Publisher shut down");
    Ok(())
}
