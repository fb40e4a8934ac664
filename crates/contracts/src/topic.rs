//! Topic expectations and live topic descriptions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use validator::Validate;

/// Declared shape a topic must have at startup
///
/// `topic_name` identifies the topic within a registration; two expectations
/// with the same name in one registration are rejected when it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ExpectedTopicConfiguration {
    /// Broker-side topic name
    #[serde(alias = "name")]
    #[validate(length(min = 1))]
    pub topic_name: String,

    /// Expected number of partitions (unchecked when absent)
    #[serde(default, alias = "partitions")]
    #[validate(range(min = 1))]
    pub partition_count: Option<u32>,

    /// Expected replication factor (unchecked when absent)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub replication_factor: Option<u32>,

    /// Expected topic-level configuration entries
    #[serde(default, alias = "config")]
    pub config_entries: BTreeMap<String, String>,
}

impl ExpectedTopicConfiguration {
    /// Start describing the expected shape of `topic_name`
    pub fn builder(topic_name: impl Into<String>) -> ExpectedTopicBuilder {
        ExpectedTopicBuilder {
            inner: Self {
                topic_name: topic_name.into(),
                partition_count: None,
                replication_factor: None,
                config_entries: BTreeMap::new(),
            },
        }
    }

    /// Expectation that only names the topic
    pub fn named(topic_name: impl Into<String>) -> Self {
        Self::builder(topic_name).build()
    }
}

/// Fluent builder for [`ExpectedTopicConfiguration`]
#[derive(Debug, Clone)]
pub struct ExpectedTopicBuilder {
    inner: ExpectedTopicConfiguration,
}

impl ExpectedTopicBuilder {
    pub fn with_partition_count(mut self, count: u32) -> Self {
        self.inner.partition_count = Some(count);
        self
    }

    pub fn with_replication_factor(mut self, factor: u32) -> Self {
        self.inner.replication_factor = Some(factor);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.config_entries.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ExpectedTopicConfiguration {
        self.inner
    }
}

/// Live shape of a topic as reported by the broker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicDescription {
    pub partition_count: u32,
    pub replication_factor: u32,
    pub config_entries: BTreeMap<String, String>,
}

/// One difference between an expectation and the live topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicMismatch {
    /// Topic does not exist on the broker
    MissingTopic { topic: String },
    PartitionCount {
        topic: String,
        expected: u32,
        actual: u32,
    },
    ReplicationFactor {
        topic: String,
        expected: u32,
        actual: u32,
    },
    /// Config entry differs or is absent (`actual == None`)
    ConfigEntry {
        topic: String,
        key: String,
        expected: String,
        actual: Option<String>,
    },
}

impl TopicMismatch {
    pub fn topic(&self) -> &str {
        match self {
            Self::MissingTopic { topic }
            | Self::PartitionCount { topic, .. }
            | Self::ReplicationFactor { topic, .. }
            | Self::ConfigEntry { topic, .. } => topic,
        }
    }
}

impl fmt::Display for TopicMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTopic { topic } => write!(f, "topic '{topic}' does not exist"),
            Self::PartitionCount {
                topic,
                expected,
                actual,
            } => write!(
                f,
                "topic '{topic}' partition count: expected {expected}, actual {actual}"
            ),
            Self::ReplicationFactor {
                topic,
                expected,
                actual,
            } => write!(
                f,
                "topic '{topic}' replication factor: expected {expected}, actual {actual}"
            ),
            Self::ConfigEntry {
                topic,
                key,
                expected,
                actual,
            } => match actual {
                Some(actual) => write!(
                    f,
                    "topic '{topic}' config '{key}': expected {expected}, actual {actual}"
                ),
                None => write!(
                    f,
                    "topic '{topic}' config '{key}': expected {expected}, actual <absent>"
                ),
            },
        }
    }
}
