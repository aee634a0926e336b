// Kafka integration for the notification pipeline.
//
// One producing connection per service, one consuming loop per worker. The
// transport treats payloads as opaque bytes; the `mail` module owns the wire
// format.

pub mod admin;
pub mod circuit_breaker;
pub mod client;
pub mod consumer;
pub mod metrics;
pub mod producer;

// Re-export commonly used types
pub use admin::{ensure_topic, TopicSpec};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use client::create_client_config;
pub use consumer::{EventConsumer, EventHandler};
pub use producer::EventPublisher;
