//! Registration - immutable consumer description

use std::fmt;
use std::sync::Arc;

use contracts::{
    ConsumerConfig, Deserializer, ErrorHandler, ExpectedTopicConfiguration, ListenerConfig,
    MessageHandler, TopicName,
};

use crate::builder::ListenerStage;
use crate::ConfigRef;

/// Immutable description of one consumer
///
/// Produced by [`Registration::builder`]; handed to the dispatch engine,
/// which owns it from then on.
pub struct Registration<K, V> {
    pub(crate) name: Arc<str>,
    pub(crate) key_deserializer: Arc<dyn Deserializer<K>>,
    pub(crate) value_deserializer: Arc<dyn Deserializer<V>>,
    pub(crate) topics: Vec<ExpectedTopicConfiguration>,
    pub(crate) handler: Arc<dyn MessageHandler<K, V>>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) check_topic_configuration: bool,
    pub(crate) consumer_config: ConfigRef<ConsumerConfig>,
    pub(crate) listener_config: ConfigRef<ListenerConfig>,
}

impl<K, V> Registration<K, V> {
    /// Start a new registration
    pub fn builder() -> ListenerStage<K, V> {
        ListenerStage::new()
    }

    /// Name used in logs, metrics and status reports
    ///
    /// Defaults to the comma-separated topic names.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn key_deserializer(&self) -> &Arc<dyn Deserializer<K>> {
        &self.key_deserializer
    }

    pub fn value_deserializer(&self) -> &Arc<dyn Deserializer<V>> {
        &self.value_deserializer
    }

    /// Topic expectations, in declaration order
    pub fn topics(&self) -> &[ExpectedTopicConfiguration] {
        &self.topics
    }

    pub fn topic_names(&self) -> Vec<TopicName> {
        self.topics
            .iter()
            .map(|t| TopicName::from(&t.topic_name))
            .collect()
    }

    pub fn handler(&self) -> &Arc<dyn MessageHandler<K, V>> {
        &self.handler
    }

    pub fn error_handler(&self) -> &Arc<dyn ErrorHandler> {
        &self.error_handler
    }

    pub fn check_topic_configuration(&self) -> bool {
        self.check_topic_configuration
    }

    pub fn consumer_config(&self) -> &ConfigRef<ConsumerConfig> {
        &self.consumer_config
    }

    pub fn listener_config(&self) -> &ConfigRef<ListenerConfig> {
        &self.listener_config
    }
}

impl<K, V> fmt::Debug for Registration<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("topics", &self.topics)
            .field("check_topic_configuration", &self.check_topic_configuration)
            .field("consumer_config", &self.consumer_config)
            .field("listener_config", &self.listener_config)
            .finish_non_exhaustive()
    }
}
