//! ConsumerConfig - connection and commit behavior of a consumer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// When processed offsets are acknowledged to the broker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStrategy {
    /// The broker client commits periodically on its own
    Auto,
    /// One synchronous commit per polled batch
    #[default]
    SyncAfterBatch,
    /// One synchronous commit per resolved record
    SyncAfterRecord,
}

impl CommitStrategy {
    /// Whether the broker client itself should commit consumed offsets
    pub fn uses_auto_commit(self) -> bool {
        matches!(self, Self::Auto)
    }
}

/// Consumer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ConsumerConfig {
    /// Consumer group shared by all workers of a registration
    #[serde(default = "default_group_id", alias = "group")]
    #[validate(length(min = 1))]
    pub group_id: String,

    /// Worker client ids are `{client_id_prefix}-{instance}`
    #[serde(default = "default_client_id_prefix", alias = "client_id")]
    #[validate(length(min = 1))]
    pub client_id_prefix: String,

    /// Offset commit timing
    #[serde(default)]
    pub commit_strategy: CommitStrategy,

    /// Broker connection parameters, passed to the broker client untouched
    #[serde(default, alias = "config")]
    pub properties: BTreeMap<String, String>,
}

fn default_group_id() -> String {
    "default".to_string()
}

fn default_client_id_prefix() -> String {
    "consumer".to_string()
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            client_id_prefix: default_client_id_prefix(),
            commit_strategy: CommitStrategy::default(),
            properties: BTreeMap::new(),
        }
    }
}

impl ConsumerConfig {
    /// Create a consumer config for the given group
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn with_client_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.client_id_prefix = prefix.into();
        self
    }

    pub fn with_commit_strategy(mut self, strategy: CommitStrategy) -> Self {
        self.commit_strategy = strategy;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Client id of the worker with the given instance index
    pub fn client_id(&self, instance: usize) -> String {
        format!("{}-{}", self.client_id_prefix, instance)
    }
}
