//! # Broker
//!
//! Broker-side collaborators for the consumer engine.
//!
//! Responsibilities:
//! - Provide consumer sessions (`ConsumerFactory` / `BrokerConsumer`)
//! - Answer topic metadata queries (`TopicMetadata`)
//! - Offer an in-memory broker for tests and local runs
//!
//! ## Feature Flags
//!
//! - `real-kafka`: Enable the Kafka implementation (requires rdkafka / librdkafka)

pub mod memory;

#[cfg(feature = "real-kafka")]
pub mod kafka;

pub use memory::{CommitEntry, MemoryBroker, MemoryBrokerConfig, MemoryConsumer};

#[cfg(feature = "real-kafka")]
pub use kafka::{KafkaBrokerConsumer, KafkaConsumerFactory, KafkaTopicMetadata};
