//! Error taxonomy for the notification pipeline.
//!
//! Every boundary reports failure through a typed `Result` instead of logging
//! and swallowing internally, so callers (and tests) can see exactly what
//! went wrong. The swallowing happens, deliberately, at the call sites that
//! own the best-effort contract: request handlers log a `PublishError` and
//! move on, the consumer loop logs a `HandlerError` and commits the offset.

use std::time::Duration;

use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;

/// Broker connection could not be established.
///
/// Fatal for the consumer process at startup. In a publishing process this is
/// logged and the service degrades to a not-initialized publisher instead.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("broker unreachable after {attempts} attempts: {source}")]
    Unreachable {
        attempts: u32,
        #[source]
        source: KafkaError,
    },

    #[error("invalid Kafka client configuration: {source}")]
    Config {
        #[source]
        source: KafkaError,
    },
}

/// Topic provisioning failed. `TopicAlreadyExists` never surfaces here: a
/// concurrent instance winning the creation race is success.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to create Kafka admin client: {source}")]
    AdminClient {
        #[source]
        source: KafkaError,
    },

    /// The broker never answered the provisioning probe. The producing
    /// process treats this like a connect failure and degrades instead of
    /// refusing to start; every other variant means the broker answered and
    /// rejected something, which a retry will not fix.
    #[error("broker unreachable during provisioning: {source}")]
    Unreachable {
        #[source]
        source: ConnectError,
    },

    #[error("create-topics request failed: {source}")]
    CreateRequest {
        #[source]
        source: KafkaError,
    },

    #[error("broker rejected creation of topic '{topic}': {code}")]
    Rejected { topic: String, code: RDKafkaErrorCode },
}

/// A single publish attempt failed.
#[derive(Debug, Error)]
pub enum PublishError {
    /// No live producer connection: Kafka is disabled or startup degraded.
    /// Returned immediately, without touching the network.
    #[error("publisher not initialized - message not sent")]
    NotInitialized,

    #[error("failed to serialize payload: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("broker rejected publish to '{topic}': {source}")]
    Rejected {
        topic: String,
        #[source]
        source: KafkaError,
    },

    #[error("publish timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The publish circuit is open after repeated broker failures; the send
    /// was rejected without blocking the caller.
    #[error("publish rejected - broker circuit open ({open_for:?} since last failure)")]
    CircuitOpen { open_for: Duration },
}

/// Consumer construction or subscription failed. Retryable from the caller's
/// point of view; the worker treats it as fatal at startup because a mail
/// worker without a broker has nothing to do.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("Kafka is disabled (KAFKA_ENABLED=false) - consumer cannot start")]
    Disabled,

    #[error("failed to create Kafka consumer: {source}")]
    Consumer {
        #[source]
        source: KafkaError,
    },

    #[error("failed to subscribe to topic '{topic}': {source}")]
    Subscription {
        topic: String,
        #[source]
        source: KafkaError,
    },
}

/// A handler rejected one message. Contained at the per-message boundary of
/// the consumer loop; never escalated into the loop or the process.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Payload did not decode into the expected wire format.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The downstream delivery provider failed.
    #[error("delivery failed: {0}")]
    Delivery(String),
}
