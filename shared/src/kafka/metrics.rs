//! Prometheus metrics for the Kafka pipeline.
//!
//! Exposition is the embedding service's concern; this module only registers
//! and updates the counters.

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter, opts};

/// Messages acknowledged by the broker
pub static KAFKA_PRODUCE_SUCCESS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "hireheaven_kafka_produce_success_total",
        "Messages acknowledged by the Kafka broker"
    ))
    .expect("Failed to register KAFKA_PRODUCE_SUCCESS metric")
});

/// Publish attempts rejected, timed out, or dropped (not initialized)
pub static KAFKA_PRODUCE_FAILURE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "hireheaven_kafka_produce_failure_total",
        "Publish attempts that failed or were dropped"
    ))
    .expect("Failed to register KAFKA_PRODUCE_FAILURE metric")
});

/// Broker acknowledgment latency
pub static KAFKA_PRODUCE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "hireheaven_kafka_produce_latency_seconds",
        "Time from send to broker acknowledgment",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]
    )
    .expect("Failed to register KAFKA_PRODUCE_LATENCY metric")
});

/// Messages received and dispatched to a handler
pub static KAFKA_CONSUME_SUCCESS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "hireheaven_kafka_consume_success_total",
        "Messages received and dispatched to a handler"
    ))
    .expect("Failed to register KAFKA_CONSUME_SUCCESS metric")
});

/// Consumer-side broker errors (retried in the loop)
pub static KAFKA_CONSUME_FAILURE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "hireheaven_kafka_consume_failure_total",
        "Consumer receive errors"
    ))
    .expect("Failed to register KAFKA_CONSUME_FAILURE metric")
});

/// Handler invocations that returned an error (message skipped, offset committed)
pub static HANDLER_FAILURE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "hireheaven_handler_failure_total",
        "Handler invocations that returned an error"
    ))
    .expect("Failed to register HANDLER_FAILURE metric")
});
