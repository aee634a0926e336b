// ============================================================================
// Kafka Configuration
// ============================================================================

/// Topic every service publishes notification mail to. The mail worker
/// subscribes to the same name; both sides default to it via `KAFKA_TOPIC`.
pub const SEND_MAIL_TOPIC: &str = "send-mail";

/// Connect-probe retry policy.
///
/// A freshly created rdkafka handle is lazy, so reachability is verified with
/// a metadata probe retried with exponential backoff: `initial_backoff_ms`
/// doubled per attempt, capped at `max_backoff_ms`.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 3000,
            max_backoff_ms: 30000,
        }
    }
}

/// Kafka configuration for the notification pipeline
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Whether Kafka is enabled (false = publishes are dropped with an error)
    pub enabled: bool,
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// Logical client identity, visible in broker logs
    pub client_id: String,
    /// Topic name for notification mail events
    pub topic: String,
    /// Number of partitions when the topic is first provisioned
    pub topic_partitions: i32,
    /// Replication factor when the topic is first provisioned
    pub topic_replication: i32,
    /// Consumer group ID for mail workers
    pub consumer_group: String,
    /// Where a new consumer group starts reading ("latest" | "earliest")
    pub offset_reset: String,
    /// librdkafka internal log level ("error" by default to suppress noise)
    pub driver_log_level: String,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    // producer-specific settings
    pub producer_acks: String, // "all" | "1" | "0"
    pub producer_retries: u32,
    pub producer_retry_backoff_ms: u32,
    pub producer_linger_ms: u32,
    pub producer_request_timeout_ms: u32,
    pub producer_delivery_timeout_ms: u32,
    pub producer_enable_idempotence: bool,
    /// Connect-probe retry policy
    pub retry: RetryConfig,
}

/// Defaults mirror the `from_env` fallbacks, so a default config points at a
/// local development broker.
impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            brokers: "localhost:9092".to_string(),
            client_id: "hireheaven".to_string(),
            topic: SEND_MAIL_TOPIC.to_string(),
            topic_partitions: 1,
            topic_replication: 1,
            consumer_group: "mail-service-group".to_string(),
            offset_reset: "latest".to_string(),
            driver_log_level: "error".to_string(),
            ssl_enabled: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            producer_acks: "all".to_string(),
            producer_retries: 10,
            producer_retry_backoff_ms: 300,
            producer_linger_ms: 10,
            producer_request_timeout_ms: 30000,
            producer_delivery_timeout_ms: 30000,
            producer_enable_idempotence: true,
            retry: RetryConfig::default(),
        }
    }
}

impl KafkaConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            enabled: std::env::var("KAFKA_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            brokers: std::env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            client_id: std::env::var("KAFKA_CLIENT_ID")
                .unwrap_or_else(|_| "hireheaven".to_string()),
            topic: std::env::var("KAFKA_TOPIC").unwrap_or_else(|_| SEND_MAIL_TOPIC.to_string()),
            topic_partitions: std::env::var("KAFKA_TOPIC_PARTITIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            topic_replication: std::env::var("KAFKA_TOPIC_REPLICATION")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            consumer_group: std::env::var("KAFKA_CONSUMER_GROUP")
                .unwrap_or_else(|_| "mail-service-group".to_string()),
            offset_reset: std::env::var("KAFKA_OFFSET_RESET")
                .unwrap_or_else(|_| "latest".to_string()),
            driver_log_level: std::env::var("KAFKA_DRIVER_LOG_LEVEL")
                .unwrap_or_else(|_| "error".to_string()),
            ssl_enabled: std::env::var("KAFKA_SSL_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM").ok(),
            sasl_username: std::env::var("KAFKA_SASL_USERNAME").ok(),
            sasl_password: std::env::var("KAFKA_SASL_PASSWORD").ok(),
            // producer-specific settings
            producer_acks: std::env::var("KAFKA_PRODUCER_ACKS")
                .unwrap_or_else(|_| "all".to_string()),
            producer_retries: std::env::var("KAFKA_PRODUCER_RETRIES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            producer_retry_backoff_ms: std::env::var("KAFKA_PRODUCER_RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            producer_linger_ms: std::env::var("KAFKA_PRODUCER_LINGER_MS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            producer_request_timeout_ms: std::env::var("KAFKA_PRODUCER_REQUEST_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30000),
            producer_delivery_timeout_ms: std::env::var("KAFKA_PRODUCER_DELIVERY_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30000),
            producer_enable_idempotence: std::env::var("KAFKA_PRODUCER_ENABLE_IDEMPOTENCE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            retry: RetryConfig {
                max_attempts: std::env::var("KAFKA_CONNECT_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                initial_backoff_ms: std::env::var("KAFKA_CONNECT_INITIAL_BACKOFF_MS")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
                max_backoff_ms: std::env::var("KAFKA_CONNECT_MAX_BACKOFF_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()
                    .unwrap_or(30000),
            },
        }
    }
}
