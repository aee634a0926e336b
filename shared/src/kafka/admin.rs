use std::time::Duration;

use hireheaven_config::KafkaConfig;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication, TopicResult};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use tracing::{debug, info};

use super::client::{await_broker, create_client_config};
use crate::error::ProvisionError;

/// Timeout for admin metadata lookups and the create-topics request.
const ADMIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Desired shape of a topic, taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
}

impl TopicSpec {
    pub fn from_config(config: &KafkaConfig) -> Self {
        Self {
            name: config.topic.clone(),
            partitions: config.topic_partitions,
            replication: config.topic_replication,
        }
    }
}

/// Ensures `spec` exists on the broker, creating it if missing.
///
/// Safe to call from any number of service instances at startup: an existing
/// topic short-circuits, and losing the creation race to a concurrent caller
/// (`TopicAlreadyExists`) is treated as success. An existing topic is
/// accepted as-is; its partition count and replication are never altered.
///
/// The admin client lives only for the duration of this call. Producers and
/// consumers hold their own long-lived connections.
pub async fn ensure_topic(config: &KafkaConfig, spec: &TopicSpec) -> Result<(), ProvisionError> {
    let admin: AdminClient<DefaultClientContext> = create_client_config(config)
        .create()
        .map_err(|source| ProvisionError::AdminClient { source })?;

    // Listing all topics avoids the broker-side auto-creation that a
    // single-topic metadata request can trigger. The lookup doubles as the
    // reachability probe, retried with the configured backoff so a broker
    // still coming up stalls provisioning instead of failing it.
    let metadata = await_broker(&config.retry, || {
        admin.inner().fetch_metadata(None, ADMIN_TIMEOUT)
    })
    .await
    .map_err(|source| ProvisionError::Unreachable { source })?;

    if let Some(existing) = metadata.topics().iter().find(|t| t.name() == spec.name) {
        debug!(
            topic = %spec.name,
            partitions = existing.partitions().len(),
            "Topic already exists, skipping creation"
        );
        return Ok(());
    }

    let new_topic = NewTopic::new(
        &spec.name,
        spec.partitions,
        TopicReplication::Fixed(spec.replication),
    );
    let options = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));

    let results = admin
        .create_topics([&new_topic], &options)
        .await
        .map_err(|source| ProvisionError::CreateRequest { source })?;

    for result in results {
        accept_create_result(result)?;
    }

    info!(
        topic = %spec.name,
        partitions = spec.partitions,
        replication = spec.replication,
        "Topic created"
    );

    Ok(())
}

/// Maps one per-topic creation result. `TopicAlreadyExists` means a
/// concurrent instance won the race, which is exactly the desired end state.
fn accept_create_result(result: TopicResult) -> Result<(), ProvisionError> {
    match result {
        Ok(_) => Ok(()),
        Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
            debug!(topic = %topic, "Topic created concurrently by another instance");
            Ok(())
        }
        Err((topic, code)) => Err(ProvisionError::Rejected { topic, code }),
    }
}
