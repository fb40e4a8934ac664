//! Broker collaborator traits
//!
//! The engine only talks to the broker through these traits, so the in-memory
//! broker used by tests and a real Kafka client are interchangeable.

use std::future::Future;
use std::time::Duration;

use crate::{
    CommitOffset, ConsumerConfig, ContractError, RawRecord, TopicDescription, TopicName,
    TopicPartition,
};

/// Commit request mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Wait for the broker to acknowledge the commit
    Sync,
    /// Fire and forget
    Async,
}

/// Broker metadata query used by topic validation
pub trait TopicMetadata: Send + Sync {
    /// Live shape of `topic`, `None` if it does not exist
    fn describe_topic(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<Option<TopicDescription>, ContractError>> + Send;
}

/// A broker session owned by exactly one worker
#[trait_variant::make(BrokerConsumer: Send)]
pub trait LocalBrokerConsumer {
    /// Client id this session was created with (used for logging)
    fn client_id(&self) -> &str;

    /// Join the consumer group for `topics`
    async fn subscribe(&mut self, topics: &[TopicName]) -> Result<(), ContractError>;

    /// Block up to `timeout` for records
    ///
    /// Records of one partition are returned in offset order. Returns an empty
    /// batch on timeout.
    async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> Result<Vec<RawRecord>, ContractError>;

    /// Commit the given positions
    async fn commit(&mut self, offsets: &[CommitOffset], mode: CommitMode)
        -> Result<(), ContractError>;

    /// Mark positions as resolved for auto-commit
    ///
    /// Auto-commit only ever publishes stored positions, never the fetch
    /// position, so unresolved records are redelivered.
    fn store_offsets(&mut self, offsets: &[CommitOffset]) -> Result<(), ContractError>;

    /// Partitions currently assigned to this session
    fn assigned_partitions(&self) -> Vec<TopicPartition>;

    /// Leave the consumer group
    async fn close(&mut self) -> Result<(), ContractError>;
}

/// Creates one broker session per worker
pub trait ConsumerFactory: Send + Sync {
    type Consumer: BrokerConsumer + 'static;

    fn create_consumer(
        &self,
        config: &ConsumerConfig,
        client_id: &str,
    ) -> Result<Self::Consumer, ContractError>;
}
