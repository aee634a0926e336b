// Mail Worker - consumes send-mail events and delivers them over SMTP
// ============================================================================
//
// Request-serving services never talk to the mail provider directly: they
// publish a send-mail event to Kafka and return. This worker owns delivery.
//
// Guarantees:
// - At-least-once: the offset moves only after the handler has run, so a
//   crash mid-delivery redelivers the event (duplicate email over lost email)
// - Per-partition ordering: one dispatch loop, event N+1 waits for N
// - A bad message is logged with its position and skipped, never a crash
// - SIGTERM/SIGINT drain: the in-flight handler finishes and offsets are
//   committed, bounded by WORKER_DRAIN_TIMEOUT_SECS
//
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hireheaven_config::Config;
use hireheaven_messaging::kafka::metrics;
use hireheaven_messaging::{EventConsumer, MailEventHandler, SmtpMailer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Mail Worker Starting ===");
    info!("Kafka Enabled: {}", config.kafka.enabled);
    info!("Kafka Brokers: {}", config.kafka.brokers);
    info!("Kafka Topic: {}", config.kafka.topic);
    info!("Kafka Consumer Group: {}", config.kafka.consumer_group);
    info!("SMTP Relay: {}:{}", config.smtp.host, config.smtp.port);

    let mailer = SmtpMailer::new(&config.smtp).context("Failed to initialize SMTP mailer")?;
    let handler = Arc::new(MailEventHandler::new(mailer));

    // A worker without a broker has nothing to do: subscription failures
    // (including KAFKA_ENABLED=false) are fatal here, unlike the publishing
    // side which degrades.
    let consumer = EventConsumer::subscribe(&config.kafka, handler)
        .context("Failed to initialize Kafka consumer")?;

    // Shutdown flag, flipped once on SIGTERM/Ctrl-C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut worker = tokio::spawn(consumer.run(shutdown_rx));

    // Periodic counter log, matching the scrape-less deployment
    tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.tick().await; // First tick fires immediately, skip it
        loop {
            interval.tick().await;
            info!(
                consumed = metrics::KAFKA_CONSUME_SUCCESS.get(),
                consume_errors = metrics::KAFKA_CONSUME_FAILURE.get(),
                handler_failures = metrics::HANDLER_FAILURE.get(),
                "Mail worker counters"
            );
        }
    });

    tokio::select! {
        _ = wait_for_signal() => {
            shutdown_tx.send(true).ok();

            let drain = Duration::from_secs(config.worker.drain_timeout_secs);
            match tokio::time::timeout(drain, &mut worker).await {
                Ok(Ok(Ok(()))) => info!("Mail worker stopped gracefully"),
                Ok(Ok(Err(e))) => {
                    error!(error = %e, "Consumer loop failed while draining");
                    return Err(e);
                }
                Ok(Err(join_err)) => {
                    error!(error = %join_err, "Consumer task panicked");
                    return Err(anyhow::anyhow!("consumer task panicked: {join_err}"));
                }
                Err(_) => {
                    warn!(
                        timeout_secs = config.worker.drain_timeout_secs,
                        "Drain timeout exceeded - terminating with work in flight"
                    );
                    worker.abort();
                }
            }
        }
        joined = &mut worker => {
            // The loop only ends on its own when something is wrong.
            match joined {
                Ok(Ok(())) => warn!("Consumer loop exited without a shutdown signal"),
                Ok(Err(e)) => {
                    error!(error = %e, "Consumer loop failed");
                    return Err(e);
                }
                Err(join_err) => {
                    error!(error = %join_err, "Consumer task panicked");
                    return Err(anyhow::anyhow!("consumer task panicked: {join_err}"));
                }
            }
        }
    }

    Ok(())
}

/// Resolves on the first SIGTERM or SIGINT.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, initiating graceful shutdown...");
    }
}
