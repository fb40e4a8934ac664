//! Kafka implementation of the broker collaborators
//!
//! Wraps rdkafka's `StreamConsumer` and `AdminClient`.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    BrokerConsumer, CommitMode, CommitOffset, ConsumerConfig, ConsumerFactory, ContractError,
    RawRecord, RecordHeader, TopicDescription, TopicMetadata, TopicName, TopicPartition,
};
use rdkafka::admin::{AdminClient, AdminOptions, ResourceSpecifier};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode as KafkaCommitMode, Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, instrument, warn};

/// Gap after the first record within which further records join the batch
const BATCH_LINGER: Duration = Duration::from_millis(10);

/// Creates one `StreamConsumer` per worker
#[derive(Debug, Default, Clone)]
pub struct KafkaConsumerFactory;

impl ConsumerFactory for KafkaConsumerFactory {
    type Consumer = KafkaBrokerConsumer;

    fn create_consumer(
        &self,
        config: &ConsumerConfig,
        client_id: &str,
    ) -> Result<KafkaBrokerConsumer, ContractError> {
        let mut client = ClientConfig::new();
        for (key, value) in &config.properties {
            client.set(key, value);
        }
        client
            .set("group.id", &config.group_id)
            .set("client.id", client_id)
            .set(
                "enable.auto.commit",
                config.commit_strategy.uses_auto_commit().to_string(),
            )
            // auto-commit publishes only what the worker stored via `store_offsets`
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false");

        let consumer: StreamConsumer = client
            .create()
            .map_err(|e| ContractError::broker("create_consumer", e.to_string()))?;

        Ok(KafkaBrokerConsumer {
            consumer,
            client_id: client_id.to_string(),
        })
    }
}

/// Kafka consumer session
pub struct KafkaBrokerConsumer {
    consumer: StreamConsumer,
    client_id: String,
}

impl BrokerConsumer for KafkaBrokerConsumer {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    #[instrument(name = "kafka_consumer_subscribe", skip(self, topics), fields(client_id = %self.client_id))]
    async fn subscribe(&mut self, topics: &[TopicName]) -> Result<(), ContractError> {
        let names: Vec<&str> = topics.iter().map(TopicName::as_str).collect();
        self.consumer
            .subscribe(&names)
            .map_err(|e| ContractError::broker("subscribe", e.to_string()))
    }

    async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> Result<Vec<RawRecord>, ContractError> {
        let mut records = Vec::new();
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(message)) => records.push(to_raw_record(&message)),
            Ok(Err(e)) => return Err(ContractError::broker("poll", e.to_string())),
            Err(_) => return Ok(records),
        }

        while records.len() < max_records {
            match tokio::time::timeout(BATCH_LINGER, self.consumer.recv()).await {
                Ok(Ok(message)) => records.push(to_raw_record(&message)),
                Ok(Err(e)) => {
                    // surfaced again by the next poll
                    warn!(client_id = %self.client_id, error = %e, "receive failed mid-batch");
                    break;
                }
                Err(_) => break,
            }
        }
        Ok(records)
    }

    #[instrument(
        name = "kafka_consumer_commit",
        skip(self, offsets),
        fields(client_id = %self.client_id, count = offsets.len())
    )]
    async fn commit(
        &mut self,
        offsets: &[CommitOffset],
        mode: CommitMode,
    ) -> Result<(), ContractError> {
        let tpl = to_partition_list(offsets, "commit")?;
        let mode = match mode {
            CommitMode::Sync => KafkaCommitMode::Sync,
            CommitMode::Async => KafkaCommitMode::Async,
        };
        self.consumer
            .commit(&tpl, mode)
            .map_err(|e| ContractError::broker("commit", e.to_string()))
    }

    fn store_offsets(&mut self, offsets: &[CommitOffset]) -> Result<(), ContractError> {
        let tpl = to_partition_list(offsets, "store_offsets")?;
        self.consumer
            .store_offsets(&tpl)
            .map_err(|e| ContractError::broker("store_offsets", e.to_string()))
    }

    fn assigned_partitions(&self) -> Vec<TopicPartition> {
        self.consumer
            .assignment()
            .map(|tpl| {
                tpl.elements()
                    .iter()
                    .map(|e| TopicPartition::new(e.topic(), e.partition()))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(client_id = %self.client_id, "unsubscribing");
        self.consumer.unsubscribe();
        Ok(())
    }
}

fn to_raw_record(message: &BorrowedMessage<'_>) -> RawRecord {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| RecordHeader {
                    key: h.key.to_string(),
                    value: h.value.map(Bytes::copy_from_slice),
                })
                .collect()
        })
        .unwrap_or_default();

    RawRecord {
        topic: TopicName::from(message.topic()),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(Bytes::copy_from_slice),
        payload: message.payload().map(Bytes::copy_from_slice),
        timestamp: message.timestamp().to_millis(),
        headers,
    }
}

fn to_partition_list(
    offsets: &[CommitOffset],
    operation: &str,
) -> Result<TopicPartitionList, ContractError> {
    let mut tpl = TopicPartitionList::new();
    for commit in offsets {
        tpl.add_partition_offset(
            &commit.partition.topic,
            commit.partition.partition,
            Offset::Offset(commit.offset),
        )
        .map_err(|e| ContractError::broker(operation, e.to_string()))?;
    }
    Ok(tpl)
}

/// Topic metadata backed by the admin API
pub struct KafkaTopicMetadata {
    admin: AdminClient<DefaultClientContext>,
    timeout: Duration,
}

impl KafkaTopicMetadata {
    /// Connect with the given client properties (at least `bootstrap.servers`)
    pub fn new(
        properties: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ContractError> {
        let mut client = ClientConfig::new();
        for (key, value) in properties {
            client.set(key, value);
        }
        let admin = client
            .create()
            .map_err(|e| ContractError::broker("create_admin", e.to_string()))?;
        Ok(Self { admin, timeout })
    }

    async fn describe_config_entries(
        &self,
        topic: &str,
    ) -> Result<BTreeMap<String, String>, ContractError> {
        let options = AdminOptions::new().request_timeout(Some(self.timeout));
        let results = self
            .admin
            .describe_configs(&[ResourceSpecifier::Topic(topic)], &options)
            .await
            .map_err(|e| ContractError::broker("describe_configs", e.to_string()))?;

        let mut entries = BTreeMap::new();
        for result in results {
            let resource = result
                .map_err(|code| ContractError::broker("describe_configs", code.to_string()))?;
            for entry in resource.entries {
                if let Some(value) = entry.value {
                    entries.insert(entry.name, value);
                }
            }
        }
        Ok(entries)
    }
}

impl TopicMetadata for KafkaTopicMetadata {
    #[instrument(name = "kafka_describe_topic", skip(self))]
    async fn describe_topic(&self, topic: &str) -> Result<Option<TopicDescription>, ContractError> {
        let (partition_count, replication_factor) = {
            let metadata = self
                .admin
                .inner()
                .fetch_metadata(Some(topic), self.timeout)
                .map_err(|e| ContractError::broker("fetch_metadata", e.to_string()))?;

            let Some(found) = metadata.topics().iter().find(|t| t.name() == topic) else {
                return Ok(None);
            };
            if let Some(err) = found.error() {
                let code = RDKafkaErrorCode::from(err);
                if code == RDKafkaErrorCode::UnknownTopicOrPartition {
                    return Ok(None);
                }
                return Err(ContractError::broker("fetch_metadata", code.to_string()));
            }
            let replication = found
                .partitions()
                .iter()
                .map(|p| p.replicas().len())
                .min()
                .unwrap_or(0);
            (found.partitions().len() as u32, replication as u32)
        };

        let config_entries = self.describe_config_entries(topic).await?;
        Ok(Some(TopicDescription {
            partition_count,
            replication_factor,
            config_entries,
        }))
    }
}
