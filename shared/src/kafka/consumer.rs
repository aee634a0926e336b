use anyhow::Context;
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::types::RDKafkaErrorCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use hireheaven_config::KafkaConfig;

use super::client::create_client_config;
use super::metrics;
use crate::error::{HandlerError, SubscribeError};

/// Pause after a consumer-side broker error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Longest payload prefix quoted in handler-failure logs.
const PAYLOAD_LOG_LIMIT: usize = 256;

/// Processes one consumed event.
///
/// Failure is reported by return value, never by unwinding. The consumer
/// loop contains a failure at the message boundary and moves on, so handlers
/// must leave themselves in a reusable state. Offsets are committed after
/// the handler returns: on a crash before commit the event is redelivered,
/// and handlers must tolerate processing it twice.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Kafka event consumer for the mail worker.
///
/// This consumer is configured for:
/// - Manual offset commits, after the handler has run (at-least-once)
/// - Consumer group coordination (multiple workers share the topic)
/// - Auto-rebalancing on worker addition/removal
pub struct EventConsumer {
    consumer: StreamConsumer,
    topic: String,
    handler: Arc<dyn EventHandler>,
}

impl EventConsumer {
    /// Create a consumer subscribed to the configured topic.
    ///
    /// # Configuration
    /// - `group.id`: stable worker group, offsets survive restarts.
    /// - `enable.auto.commit=false`: offsets move only after a handler ran.
    /// - `auto.offset.reset`: where a brand-new group starts (`latest` by
    ///   default - the worker reads from the current end of the log).
    /// - `allow.auto.create.topics=false`: topic settings belong to the
    ///   provisioner, subscribing must not create a half-configured topic.
    pub fn subscribe(
        config: &KafkaConfig,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self, SubscribeError> {
        if !config.enabled {
            return Err(SubscribeError::Disabled);
        }

        info!("Initializing Kafka consumer...");

        let consumer: StreamConsumer = create_client_config(config)
            .set("group.id", &config.consumer_group)
            // Offset management
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.offset_reset)
            .set("allow.auto.create.topics", "false")
            // Performance
            .set("fetch.min.bytes", "1")
            .set("fetch.wait.max.ms", "500")
            .set("max.partition.fetch.bytes", "1048576") // 1MB
            // Session management
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000") // 5min max handler time
            .create()
            .map_err(|source| SubscribeError::Consumer { source })?;

        consumer
            .subscribe(&[&config.topic])
            .map_err(|source| SubscribeError::Subscription {
                topic: config.topic.clone(),
                source,
            })?;

        info!(
            topic = %config.topic,
            group = %config.consumer_group,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            handler,
        })
    }

    /// Consume until `shutdown` flips to true, then drain and commit.
    ///
    /// Messages are dispatched one at a time, so within a partition event
    /// N+1 is never handled before event N's handler has returned. Broker
    /// errors are logged and retried after a short pause; a handler failure
    /// is contained by [`dispatch`](Self::dispatch) and neither stops the
    /// loop nor blocks the offset.
    ///
    /// The select is biased toward the shutdown signal: once it has fired,
    /// no further message is picked up, only the in-flight handler finishes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(topic = %self.topic, "Mail consumer loop started");

        let mut handled: u64 = 0;

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    // A closed channel means the process is going away too.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                received = self.consumer.recv() => {
                    match received {
                        Ok(message) => {
                            self.dispatch(&message).await;
                            handled += 1;
                        }
                        Err(e) => {
                            metrics::KAFKA_CONSUME_FAILURE.inc();
                            error!(error = %e, "Kafka consumer error, retrying");
                            tokio::time::sleep(ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        self.drain(handled)
    }

    /// Handle one message and advance its offset.
    ///
    /// The commit happens after the handler has returned - success or caught
    /// failure - never before it runs. A worker that dies mid-handler leaves
    /// the offset untouched and the event is redelivered on restart.
    async fn dispatch(&self, message: &BorrowedMessage<'_>) {
        let payload = message.payload().unwrap_or_default();

        match invoke_handler(self.handler.as_ref(), payload).await {
            Ok(()) => {
                metrics::KAFKA_CONSUME_SUCCESS.inc();
                debug!(
                    partition = message.partition(),
                    offset = message.offset(),
                    "Event handled"
                );
            }
            Err(e) => {
                metrics::HANDLER_FAILURE.inc();
                error!(
                    error = %e,
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    payload = %truncate_payload(payload),
                    "Handler failed - skipping event"
                );
            }
        }

        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            warn!(
                error = %e,
                partition = message.partition(),
                offset = message.offset(),
                "Failed to commit offset"
            );
        }
    }

    /// Final synchronous commit before the connection drops.
    fn drain(&self, handled: u64) -> anyhow::Result<()> {
        info!(events_handled = handled, "Mail consumer draining");

        if handled > 0 {
            match self.consumer.commit_consumer_state(CommitMode::Sync) {
                Ok(()) => {}
                // Async commits may already have covered everything.
                Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                    debug!("No offsets left to commit");
                }
                Err(e) => return Err(e).context("Final offset commit failed"),
            }
        }

        info!("Mail consumer stopped");
        Ok(())
    }
}

/// The per-message failure boundary: a handler error ends here.
async fn invoke_handler(
    handler: &dyn EventHandler,
    payload: &[u8],
) -> Result<(), HandlerError> {
    handler.handle(payload).await
}

/// Quote at most [`PAYLOAD_LOG_LIMIT`] bytes of a payload for log output.
fn truncate_payload(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    if text.len() <= PAYLOAD_LOG_LIMIT {
        return text.into_owned();
    }

    let mut end = PAYLOAD_LOG_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &text[..end], payload.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every payload it sees; fails the nth call when told to.
    struct RecordingHandler {
        calls: Mutex<Vec<String>>,
        fail_on_call: Option<usize>,
    }

    impl RecordingHandler {
        fn new(fail_on_call: Option<usize>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on_call,
            }
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(String::from_utf8_lossy(payload).into_owned());

            if self.fail_on_call == Some(calls.len()) {
                return Err(HandlerError::Delivery("simulated SMTP outage".to_string()));
            }
            Ok(())
        }
    }

    fn test_config(enabled: bool) -> KafkaConfig {
        KafkaConfig {
            enabled,
            // Port 1 is never a broker; handle creation stays lazy.
            brokers: "localhost:1".to_string(),
            topic: "send-mail".to_string(),
            consumer_group: "consumer-unit-test-group".to_string(),
            ..KafkaConfig::default()
        }
    }

    #[test]
    fn test_subscribe_fails_when_disabled() {
        let handler = Arc::new(RecordingHandler::new(None));
        let result = EventConsumer::subscribe(&test_config(false), handler);

        assert!(matches!(result, Err(SubscribeError::Disabled)));
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_stop_later_events() {
        let handler = RecordingHandler::new(Some(2));

        for payload in [&b"first"[..], b"second", b"third"] {
            // The loop ignores the outcome; it only must not unwind.
            let _ = invoke_handler(&handler, payload).await;
        }

        let calls = handler.calls.lock().unwrap();
        assert_eq!(*calls, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_run_exits_promptly_once_shutdown_is_set() {
        let handler = Arc::new(RecordingHandler::new(None));
        let consumer = EventConsumer::subscribe(&test_config(true), handler)
            .expect("consumer creation is lazy and must not need a broker");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), consumer.run(shutdown_rx)).await;

        assert!(result.is_ok(), "run did not observe the shutdown signal");
        assert!(result.unwrap().is_ok());
    }

    #[test]
    fn test_truncate_payload_passes_short_input_through() {
        assert_eq!(truncate_payload(b"{\"to\":\"a@x.com\"}"), "{\"to\":\"a@x.com\"}");
    }

    #[test]
    fn test_truncate_payload_caps_long_input() {
        let long = "x".repeat(1000);
        let truncated = truncate_payload(long.as_bytes());

        assert!(truncated.starts_with(&"x".repeat(PAYLOAD_LOG_LIMIT)));
        assert!(truncated.ends_with("(1000 bytes total)"));
    }

    #[test]
    fn test_truncate_payload_respects_char_boundaries() {
        // 2-byte character straddling the cut point must not split.
        let mut input = "x".repeat(PAYLOAD_LOG_LIMIT - 1);
        input.push('é');
        input.push_str("tail");

        let truncated = truncate_payload(input.as_bytes());
        assert!(truncated.contains("bytes total"));
    }
}
