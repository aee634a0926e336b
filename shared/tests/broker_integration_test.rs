// ============================================================================
// Broker Integration Tests
// ============================================================================
//
// End-to-end tests for the notification pipeline: provisioning, publishing,
// consuming and drain behavior against a real broker.
//
// Run with: cargo test --test broker_integration_test -- --ignored
// (Tests are marked with #[ignore] to skip unless a broker is available;
// point KAFKA_BROKERS somewhere else to override localhost:9092.)
//
// Every test provisions its own uuid-suffixed topic and consumer group, so
// reruns never see stale offsets or leftover events.
//
// ============================================================================

use std::env;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;
use tokio::sync::watch;
use uuid::Uuid;

use hireheaven_config::{KafkaConfig, RetryConfig};
use hireheaven_messaging::kafka::{ensure_topic, TopicSpec};
use hireheaven_messaging::runtime::{init_publisher, shutdown_publisher};
use hireheaven_messaging::{
    EventConsumer, EventPublisher, HandlerError, MailEventHandler, MailMessage, MailSender,
};

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn test_config(topic: &str, group: &str, partitions: i32) -> KafkaConfig {
    KafkaConfig {
        enabled: true,
        brokers: env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string()),
        client_id: "hireheaven-integration".to_string(),
        topic: topic.to_string(),
        topic_partitions: partitions,
        topic_replication: 1,
        consumer_group: group.to_string(),
        // Unique topics start empty; reading from the earliest offset makes
        // events published before the group finished joining visible.
        offset_reset: "earliest".to_string(),
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 2000,
        },
        ..KafkaConfig::default()
    }
}

/// Test double for the SMTP transport: records deliveries, optionally fails
/// one call or stalls to simulate a slow relay.
#[derive(Clone)]
struct TestSender {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    started: Arc<AtomicU32>,
    fail_on_call: Option<u32>,
    delay: Option<Duration>,
}

impl TestSender {
    fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            started: Arc::new(AtomicU32::new(0)),
            fail_on_call: None,
            delay: None,
        }
    }

    fn failing_on_call(n: u32) -> Self {
        Self {
            fail_on_call: Some(n),
            ..Self::new()
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn calls_started(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSender for TestSender {
    async fn send(&self, message: &MailMessage) -> Result<(), HandlerError> {
        let call = self.started.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_on_call == Some(call) {
            return Err(HandlerError::Delivery("simulated relay outage".to_string()));
        }

        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Polls `condition` until it holds or `timeout` expires.
async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

fn reset_message() -> MailMessage {
    MailMessage::new("a@x.com", "Reset", "<p>link</p>")
}

#[tokio::test]
#[serial]
#[ignore] // Requires Kafka - run with: cargo test --test broker_integration_test -- --ignored
async fn test_concurrent_provisioning_is_idempotent() {
    let topic = unique("provision");
    let config = test_config(&topic, &unique("group"), 1);
    let spec = TopicSpec::from_config(&config);

    // Several service instances race to create the same topic at startup.
    let mut racers = Vec::new();
    for _ in 0..5 {
        let config = config.clone();
        let spec = spec.clone();
        racers.push(tokio::spawn(async move {
            ensure_topic(&config, &spec).await
        }));
    }

    for outcome in futures_util::future::join_all(racers).await {
        outcome.unwrap().unwrap();
    }

    // A later rerun short-circuits on the existing topic.
    ensure_topic(&config, &spec).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Kafka
async fn test_publish_to_email_roundtrip() {
    let config = test_config(&unique("send-mail"), &unique("group"), 1);

    let publisher = init_publisher(&config).await.unwrap();
    assert!(publisher.is_connected());

    let sender = TestSender::new();
    let handler = Arc::new(MailEventHandler::new(sender.clone()));
    let consumer = EventConsumer::subscribe(&config, handler).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(consumer.run(shutdown_rx));

    let (partition, offset) = publisher.publish(&config.topic, &reset_message()).await.unwrap();
    assert!(partition >= 0);
    assert!(offset >= 0);

    assert!(
        wait_until(Duration::from_secs(20), || !sender.sent().is_empty()).await,
        "event never reached the mail handler"
    );
    assert_eq!(sender.sent(), vec![reset_message()]);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("drain timed out")
        .unwrap()
        .unwrap();

    shutdown_publisher(&publisher, Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Kafka
async fn test_keyed_events_keep_publish_order() {
    // Multiple partitions, one key: everything lands on one partition and
    // must come out in publish order.
    let config = test_config(&unique("ordered"), &unique("group"), 3);

    let spec = TopicSpec::from_config(&config);
    ensure_topic(&config, &spec).await.unwrap();
    let publisher = EventPublisher::connect(&config).await.unwrap();

    let sender = TestSender::new();
    let handler = Arc::new(MailEventHandler::new(sender.clone()));
    let consumer = EventConsumer::subscribe(&config, handler).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(consumer.run(shutdown_rx));

    let subjects = ["A", "B", "C"];
    for subject in subjects {
        let message = MailMessage::new("a@x.com", subject, "<p>link</p>");
        publisher
            .publish_keyed(&config.topic, b"a@x.com", &message)
            .await
            .unwrap();
    }

    assert!(
        wait_until(Duration::from_secs(20), || sender.sent().len() == 3).await,
        "expected all three events, saw {:?}",
        sender.sent()
    );
    let seen: Vec<String> = sender.sent().iter().map(|m| m.subject.clone()).collect();
    assert_eq!(seen, vec!["A", "B", "C"]);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("drain timed out")
        .unwrap()
        .unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Kafka
async fn test_handler_failure_skips_event_and_loop_continues() {
    let config = test_config(&unique("flaky"), &unique("group"), 1);

    let spec = TopicSpec::from_config(&config);
    ensure_topic(&config, &spec).await.unwrap();
    let publisher = EventPublisher::connect(&config).await.unwrap();

    // Second delivery fails; the loop must still attempt all three.
    let sender = TestSender::failing_on_call(2);
    let handler = Arc::new(MailEventHandler::new(sender.clone()));
    let consumer = EventConsumer::subscribe(&config, handler).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(consumer.run(shutdown_rx));

    for subject in ["first", "second", "third"] {
        publisher
            .publish(&config.topic, &MailMessage::new("a@x.com", subject, "<p>x</p>"))
            .await
            .unwrap();
    }

    assert!(
        wait_until(Duration::from_secs(20), || sender.calls_started() == 3).await,
        "loop stopped after a handler failure"
    );

    // The failed delivery is logged and skipped, not retried.
    let delivered: Vec<String> = sender.sent().iter().map(|m| m.subject.clone()).collect();
    assert_eq!(delivered, vec!["first", "third"]);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("drain timed out")
        .unwrap()
        .unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Kafka
async fn test_committed_offsets_survive_restart() {
    let topic = unique("restart");
    let group = unique("group");
    let config = test_config(&topic, &group, 1);

    let spec = TopicSpec::from_config(&config);
    ensure_topic(&config, &spec).await.unwrap();
    let publisher = EventPublisher::connect(&config).await.unwrap();

    // First worker consumes two events and shuts down cleanly.
    let first_sender = TestSender::new();
    let handler = Arc::new(MailEventHandler::new(first_sender.clone()));
    let consumer = EventConsumer::subscribe(&config, handler).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(consumer.run(shutdown_rx));

    for subject in ["one", "two"] {
        publisher
            .publish(&config.topic, &MailMessage::new("a@x.com", subject, "<p>x</p>"))
            .await
            .unwrap();
    }
    assert!(wait_until(Duration::from_secs(20), || first_sender.sent().len() == 2).await);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("drain timed out")
        .unwrap()
        .unwrap();

    // Second worker in the same group starts where the first one committed.
    let second_sender = TestSender::new();
    let handler = Arc::new(MailEventHandler::new(second_sender.clone()));
    let consumer = EventConsumer::subscribe(&config, handler).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(consumer.run(shutdown_rx));

    publisher
        .publish(&config.topic, &MailMessage::new("a@x.com", "three", "<p>x</p>"))
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(20), || !second_sender.sent().is_empty()).await,
        "restarted worker never received the new event"
    );
    let seen: Vec<String> = second_sender.sent().iter().map(|m| m.subject.clone()).collect();
    assert_eq!(seen, vec!["three"], "already-committed events were replayed");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("drain timed out")
        .unwrap()
        .unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Kafka
async fn test_drain_finishes_in_flight_event_and_takes_no_new_ones() {
    let config = test_config(&unique("drain"), &unique("group"), 1);

    let spec = TopicSpec::from_config(&config);
    ensure_topic(&config, &spec).await.unwrap();
    let publisher = EventPublisher::connect(&config).await.unwrap();

    // Each delivery stalls long enough for the shutdown signal to land
    // while the handler is mid-flight.
    let sender = TestSender::with_delay(Duration::from_secs(2));
    let handler = Arc::new(MailEventHandler::new(sender.clone()));
    let consumer = EventConsumer::subscribe(&config, handler).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(consumer.run(shutdown_rx));

    publisher
        .publish(&config.topic, &MailMessage::new("a@x.com", "in-flight", "<p>x</p>"))
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(20), || sender.calls_started() == 1).await,
        "handler never started"
    );

    // Signal while the handler sleeps, then put one more event on the topic.
    shutdown_tx.send(true).unwrap();
    publisher
        .publish(&config.topic, &MailMessage::new("a@x.com", "after-signal", "<p>x</p>"))
        .await
        .unwrap();

    let drained = tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("drain timed out")
        .unwrap();
    drained.unwrap();

    // The in-flight delivery completed; the post-signal event stayed queued.
    let seen: Vec<String> = sender.sent().iter().map(|m| m.subject.clone()).collect();
    assert_eq!(seen, vec!["in-flight"]);
    assert_eq!(sender.calls_started(), 1);
}
