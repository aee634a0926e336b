use anyhow::Context;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use hireheaven_config::KafkaConfig;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use super::client::{await_broker, create_client_config};
use super::metrics;
use crate::error::{ConnectError, PublishError};

/// Timeout for handing one record to the driver's send queue.
const SEND_QUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for the startup reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka event publisher for the notification pipeline.
///
/// Configured for durable hand-off:
/// - `acks=all`: every publish waits for all in-sync replicas.
/// - Idempotent writes (no duplicates within a producer session).
/// - Driver-level bounded retries for transient broker errors.
/// - Circuit breaker so a down broker cannot stall request handlers.
///
/// A publisher is either connected (live broker connection, verified at
/// startup) or not initialized (Kafka disabled, or startup degraded after the
/// broker stayed unreachable). Publishing on a not-initialized handle fails
/// immediately with [`PublishError::NotInitialized`] - loudly, so dropped
/// notifications are visible in logs, but without touching the network.
pub struct EventPublisher {
    /// Live producer connection (None = not initialized)
    producer: Option<Arc<FutureProducer>>,
    /// Shared by all clones, so failures seen by one caller protect the rest
    circuit_breaker: Arc<CircuitBreaker>,
}

impl EventPublisher {
    /// Connects to the broker and verifies reachability.
    ///
    /// rdkafka creates handles lazily, so after building the producer this
    /// probes broker metadata with the configured retry/backoff policy. The
    /// returned publisher holds the process-wide connection: create it once
    /// at startup and share clones.
    pub async fn connect(config: &KafkaConfig) -> Result<Self, ConnectError> {
        info!(brokers = %config.brokers, "Initializing Kafka producer");

        let producer: FutureProducer = create_client_config(config)
            .set("acks", &config.producer_acks)
            .set(
                "enable.idempotence",
                if config.producer_enable_idempotence {
                    "true"
                } else {
                    "false"
                },
            )
            .set("retries", config.producer_retries.to_string())
            .set(
                "retry.backoff.ms",
                config.producer_retry_backoff_ms.to_string(),
            )
            .set("linger.ms", config.producer_linger_ms.to_string())
            .set(
                "request.timeout.ms",
                config.producer_request_timeout_ms.to_string(),
            )
            .set(
                "delivery.timeout.ms",
                config.producer_delivery_timeout_ms.to_string(),
            )
            .create()
            .map_err(|source| ConnectError::Config { source })?;

        await_broker(&config.retry, || {
            producer
                .client()
                .fetch_metadata(None, PROBE_TIMEOUT)
                .map(|_| ())
        })
        .await?;

        info!("Kafka producer connected");

        Ok(Self {
            producer: Some(Arc::new(producer)),
            circuit_breaker: Arc::new(CircuitBreaker::with_config(Self::breaker_config())),
        })
    }

    /// A publisher with no broker connection.
    ///
    /// Every publish returns [`PublishError::NotInitialized`]. Used when
    /// Kafka is disabled by configuration, and as the degraded fallback when
    /// the broker stays unreachable at startup.
    pub fn disconnected() -> Self {
        Self {
            producer: None,
            circuit_breaker: Arc::new(CircuitBreaker::with_config(Self::breaker_config())),
        }
    }

    fn breaker_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(3),
            reset_timeout: Duration::from_secs(30),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.producer.is_some()
    }

    /// Publishes `payload` as a JSON record on `topic`.
    ///
    /// Waits for broker acknowledgment (`acks=all`). Callers on request
    /// paths treat a returned error as best-effort exhausted: log it and move
    /// on, the triggering operation is already committed.
    pub async fn publish<T: Serialize>(
        &self,
        topic: &str,
        payload: &T,
    ) -> Result<(i32, i64), PublishError> {
        let bytes = serde_json::to_vec(payload).map_err(|source| PublishError::Serialize { source })?;
        self.publish_bytes(topic, None, &bytes).await
    }

    /// Like [`publish`](Self::publish), with a partition key. Records sharing
    /// a key land on one partition and are consumed in publish order.
    pub async fn publish_keyed<T: Serialize>(
        &self,
        topic: &str,
        key: &[u8],
        payload: &T,
    ) -> Result<(i32, i64), PublishError> {
        let bytes = serde_json::to_vec(payload).map_err(|source| PublishError::Serialize { source })?;
        self.publish_bytes(topic, Some(key), &bytes).await
    }

    /// Transport core: sends pre-encoded bytes as one record.
    ///
    /// # Returns
    /// * `Ok((partition, offset))` - acknowledged by the broker
    /// * `Err(PublishError::NotInitialized)` - no connection, nothing sent
    /// * `Err(PublishError::CircuitOpen)` - rejected fast, broker known bad
    /// * `Err(PublishError::Timeout | Rejected)` - this attempt failed
    pub async fn publish_bytes(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<(i32, i64), PublishError> {
        let Some(producer) = self.producer.as_deref() else {
            // Loud by contract: every dropped notification leaves a trace.
            metrics::KAFKA_PRODUCE_FAILURE.inc();
            error!(
                topic = topic,
                "Kafka publisher not initialized - message NOT sent"
            );
            return Err(PublishError::NotInitialized);
        };

        let result = self
            .circuit_breaker
            .call(send_record(producer, topic, key, payload))
            .await;

        match result {
            Ok(ack) => Ok(ack),
            Err(CircuitBreakerError::Open(open_for)) => {
                metrics::KAFKA_PRODUCE_FAILURE.inc();
                Err(PublishError::CircuitOpen { open_for })
            }
            Err(CircuitBreakerError::Timeout { timeout }) => {
                metrics::KAFKA_PRODUCE_FAILURE.inc();
                Err(PublishError::Timeout { timeout })
            }
            // Broker rejections are already counted inside `send_record`.
            Err(CircuitBreakerError::Inner(error)) => Err(error),
        }
    }

    /// Flush pending records (for graceful shutdown).
    ///
    /// Waits for all in-flight records to be acknowledged. Called before the
    /// publishing process exits.
    pub async fn flush(&self, timeout: Duration) -> anyhow::Result<()> {
        let producer = match &self.producer {
            Some(p) => p,
            None => return Ok(()), // Nothing to flush when not initialized
        };

        info!("Flushing Kafka producer (timeout: {:?})", timeout);

        producer
            .flush(Timeout::After(timeout))
            .context("Failed to flush Kafka producer")?;

        info!("Kafka producer flushed");
        Ok(())
    }
}

/// One acknowledged send, wrapped by the circuit breaker.
async fn send_record(
    producer: &FutureProducer,
    topic: &str,
    key: Option<&[u8]>,
    payload: &[u8],
) -> Result<(i32, i64), PublishError> {
    let mut record = FutureRecord::<[u8], [u8]>::to(topic).payload(payload);
    if let Some(key) = key {
        record = record.key(key);
    }

    let start = std::time::Instant::now();

    match producer.send(record, Timeout::After(SEND_QUEUE_TIMEOUT)).await {
        Ok((partition, offset)) => {
            let latency = start.elapsed();

            metrics::KAFKA_PRODUCE_SUCCESS.inc();
            metrics::KAFKA_PRODUCE_LATENCY.observe(latency.as_secs_f64());

            info!(
                topic = topic,
                partition = partition,
                offset = offset,
                latency_ms = latency.as_millis() as u64,
                "Event persisted to Kafka"
            );

            Ok((partition, offset))
        }
        Err((kafka_err, _unsent)) => {
            let latency = start.elapsed();

            metrics::KAFKA_PRODUCE_FAILURE.inc();

            error!(
                error = %kafka_err,
                topic = topic,
                latency_ms = latency.as_millis() as u64,
                "Failed to publish event to Kafka"
            );

            Err(PublishError::Rejected {
                topic: topic.to_string(),
                source: kafka_err,
            })
        }
    }
}

// Clone shares the connection and breaker; never duplicates them.
impl Clone for EventPublisher {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.as_ref().map(Arc::clone),
            circuit_breaker: Arc::clone(&self.circuit_breaker),
        }
    }
}
