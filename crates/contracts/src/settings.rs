//! KafkaSettings - Config Loader output
//!
//! Named listener, consumer and topic entries that registrations refer to by
//! name, plus broker-wide connection properties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ConsumerConfig, ContractError, ExpectedTopicConfiguration, ListenerConfig};

/// External configuration of the consumer engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaSettings {
    /// Bootstrap brokers, joined into `bootstrap.servers`
    #[serde(default)]
    pub brokers: Vec<String>,

    /// Properties applied to every consumer (consumer entries win on conflict)
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Named listener configurations
    #[serde(default)]
    pub listeners: BTreeMap<String, ListenerConfig>,

    /// Named consumer configurations
    #[serde(default)]
    pub consumers: BTreeMap<String, ConsumerConfig>,

    /// Named topic expectations (logical name -> expectation)
    #[serde(default)]
    pub topics: BTreeMap<String, ExpectedTopicConfiguration>,
}

impl KafkaSettings {
    /// Topic expectation registered under `name`
    pub fn topic(&self, name: &str) -> Result<ExpectedTopicConfiguration, ContractError> {
        self.topics
            .get(name)
            .cloned()
            .ok_or_else(|| ContractError::configuration(format!("unknown topic config '{name}'")))
    }

    /// Listener configuration registered under `name`
    pub fn listener(&self, name: &str) -> Result<ListenerConfig, ContractError> {
        self.listeners.get(name).cloned().ok_or_else(|| {
            ContractError::configuration(format!("unknown listener config '{name}'"))
        })
    }

    /// Consumer configuration registered under `name`, with broker-wide
    /// properties merged in
    pub fn consumer(&self, name: &str) -> Result<ConsumerConfig, ContractError> {
        let config = self.consumers.get(name).cloned().ok_or_else(|| {
            ContractError::configuration(format!("unknown consumer config '{name}'"))
        })?;
        Ok(self.apply_connection(config))
    }

    /// Merge `bootstrap.servers` and broker-wide properties into `config`
    ///
    /// Keys already present on the consumer are kept.
    pub fn apply_connection(&self, mut config: ConsumerConfig) -> ConsumerConfig {
        for (key, value) in &self.properties {
            config
                .properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if !self.brokers.is_empty() {
            config
                .properties
                .entry("bootstrap.servers".to_string())
                .or_insert_with(|| self.brokers.join(","));
        }
        config
    }
}
