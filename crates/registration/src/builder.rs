//! Staged registration builder
//!
//! `ListenerStage -> TopicStage -> ConsumerStage -> HandlerStage -> FinalStage`
//!
//! All stages wrap the same private accumulator; a stage only exposes the
//! calls that are legal at that point.

use std::collections::HashSet;
use std::sync::Arc;

use contracts::{
    ConsumerConfig, ConsumerRecord, ContractError, Decision, Deserializer, DispatchContext,
    ErrorHandler, ExpectedTopicConfiguration, HandlerError, ListenerConfig, MessageHandler,
    RawRecord, RecordFailure,
};
use error_policies::StopOnErrorHandler;
use tracing::debug;
use validator::Validate;

use crate::{ConfigRef, Registration};

struct Accumulator<K, V> {
    name: Option<String>,
    listener_config: Option<ConfigRef<ListenerConfig>>,
    topics: Vec<ExpectedTopicConfiguration>,
    check_topic_configuration: bool,
    consumer_config: Option<ConfigRef<ConsumerConfig>>,
    key_deserializer: Option<Arc<dyn Deserializer<K>>>,
    value_deserializer: Option<Arc<dyn Deserializer<V>>>,
    handler: Option<Arc<dyn MessageHandler<K, V>>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

/// First stage: listener (polling / instances) configuration
pub struct ListenerStage<K, V> {
    acc: Accumulator<K, V>,
}

/// Second stage: topics to consume
pub struct TopicStage<K, V> {
    acc: Accumulator<K, V>,
}

/// Third stage: optional topic check, then consumer configuration
pub struct ConsumerStage<K, V> {
    acc: Accumulator<K, V>,
}

/// Fourth stage: deserializers and handler
pub struct HandlerStage<K, V> {
    acc: Accumulator<K, V>,
}

/// Last stage: optional error handler and name, then `build()`
pub struct FinalStage<K, V> {
    acc: Accumulator<K, V>,
}

impl<K, V> ListenerStage<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            acc: Accumulator {
                name: None,
                listener_config: None,
                topics: Vec::new(),
                check_topic_configuration: false,
                consumer_config: None,
                key_deserializer: None,
                value_deserializer: None,
                handler: None,
                error_handler: None,
            },
        }
    }

    pub fn with_listener_config(mut self, config: ListenerConfig) -> TopicStage<K, V> {
        self.acc.listener_config = Some(ConfigRef::Inline(config));
        TopicStage { acc: self.acc }
    }

    /// Use the listener configuration registered under `name`
    pub fn with_listener_config_name(mut self, name: impl Into<String>) -> TopicStage<K, V> {
        self.acc.listener_config = Some(ConfigRef::Named(name.into()));
        TopicStage { acc: self.acc }
    }

    pub fn with_default_listener_config(self) -> TopicStage<K, V> {
        self.with_listener_config(ListenerConfig::default())
    }
}

impl<K, V> TopicStage<K, V> {
    pub fn for_topic(self, topic: impl Into<String>) -> ConsumerStage<K, V> {
        self.for_topic_configs(vec![ExpectedTopicConfiguration::named(topic)])
    }

    pub fn for_topics<I, S>(self, topics: I) -> ConsumerStage<K, V>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.for_topic_configs(
            topics
                .into_iter()
                .map(ExpectedTopicConfiguration::named)
                .collect::<Vec<_>>(),
        )
    }

    /// Topics given as full expectations, needed when the topic
    /// configuration is checked at startup
    pub fn for_topic_configs(
        mut self,
        topics: impl IntoIterator<Item = ExpectedTopicConfiguration>,
    ) -> ConsumerStage<K, V> {
        self.acc.topics = topics.into_iter().collect();
        ConsumerStage { acc: self.acc }
    }
}

impl<K, V> ConsumerStage<K, V> {
    /// Compare the live topics with the expectations before consuming
    pub fn check_topic_configuration(mut self) -> Self {
        self.acc.check_topic_configuration = true;
        self
    }

    pub fn with_consumer_config(mut self, config: ConsumerConfig) -> HandlerStage<K, V> {
        self.acc.consumer_config = Some(ConfigRef::Inline(config));
        HandlerStage { acc: self.acc }
    }

    /// Use the consumer configuration registered under `name`
    pub fn with_consumer_config_name(mut self, name: impl Into<String>) -> HandlerStage<K, V> {
        self.acc.consumer_config = Some(ConfigRef::Named(name.into()));
        HandlerStage { acc: self.acc }
    }

    /// Default consumer: group "default", commit after each batch
    pub fn with_default_consumer(self) -> HandlerStage<K, V> {
        self.with_consumer_config(ConsumerConfig::default())
    }
}

impl<K, V> HandlerStage<K, V> {
    pub fn with_key_deserializer(mut self, deserializer: impl Deserializer<K> + 'static) -> Self {
        self.acc.key_deserializer = Some(Arc::new(deserializer));
        self
    }

    pub fn with_value_deserializer(mut self, deserializer: impl Deserializer<V> + 'static) -> Self {
        self.acc.value_deserializer = Some(Arc::new(deserializer));
        self
    }

    pub fn with_handler(mut self, handler: impl MessageHandler<K, V> + 'static) -> FinalStage<K, V> {
        self.acc.handler = Some(Arc::new(handler));
        FinalStage { acc: self.acc }
    }

    /// Closure form of [`with_handler`](Self::with_handler)
    pub fn with_handler_fn<F>(self, handler: F) -> FinalStage<K, V>
    where
        F: Fn(&ConsumerRecord<K, V>, &DispatchContext) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.with_handler(handler)
    }
}

impl<K, V> FinalStage<K, V> {
    /// Policy for failed records (default: stop the worker)
    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.acc.error_handler = Some(Arc::new(handler));
        self
    }

    /// Closure form of [`with_error_handler`](Self::with_error_handler)
    pub fn with_error_handler_fn<F>(self, handler: F) -> Self
    where
        F: Fn(&RawRecord, &RecordFailure) -> Decision + Send + Sync + 'static,
    {
        self.with_error_handler(handler)
    }

    /// Name used in logs, metrics and status reports
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.acc.name = Some(name.into());
        self
    }

    /// Check and freeze the registration
    ///
    /// # Errors
    /// - `Configuration`: no topics, empty or duplicate topic names, missing
    ///   deserializer, empty config name
    /// - `ConfigValidation`: an inline configuration breaks a field rule
    pub fn build(self) -> Result<Registration<K, V>, ContractError> {
        let acc = self.acc;

        validate_topics(&acc.topics)?;

        let key_deserializer = acc
            .key_deserializer
            .ok_or_else(|| ContractError::configuration("key deserializer is required"))?;
        let value_deserializer = acc
            .value_deserializer
            .ok_or_else(|| ContractError::configuration("value deserializer is required"))?;
        let handler = acc
            .handler
            .ok_or_else(|| ContractError::configuration("message handler is required"))?;
        let listener_config = acc
            .listener_config
            .ok_or_else(|| ContractError::configuration("listener config is required"))?;
        let consumer_config = acc
            .consumer_config
            .ok_or_else(|| ContractError::configuration("consumer config is required"))?;

        check_config_ref("listener_config", &listener_config)?;
        check_config_ref("consumer_config", &consumer_config)?;

        let name = match acc.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => acc
                .topics
                .iter()
                .map(|t| t.topic_name.as_str())
                .collect::<Vec<_>>()
                .join(","),
        };

        debug!(
            registration = %name,
            topics = acc.topics.len(),
            check_topic_configuration = acc.check_topic_configuration,
            "registration built"
        );

        Ok(Registration {
            name: Arc::from(name),
            key_deserializer,
            value_deserializer,
            topics: acc.topics,
            handler,
            error_handler: acc
                .error_handler
                .unwrap_or_else(|| Arc::new(StopOnErrorHandler)),
            check_topic_configuration: acc.check_topic_configuration,
            consumer_config,
            listener_config,
        })
    }
}

fn validate_topics(topics: &[ExpectedTopicConfiguration]) -> Result<(), ContractError> {
    if topics.is_empty() {
        return Err(ContractError::configuration("no topics configured"));
    }
    let mut seen = HashSet::new();
    for topic in topics {
        if topic.topic_name.trim().is_empty() {
            return Err(ContractError::configuration("topic name must not be empty"));
        }
        if !seen.insert(topic.topic_name.as_str()) {
            return Err(ContractError::configuration(format!(
                "duplicate topic '{}'",
                topic.topic_name
            )));
        }
        topic.validate().map_err(|errors| {
            ContractError::config_validation(format!("topics.{}", topic.topic_name), errors.to_string())
        })?;
    }
    Ok(())
}

fn check_config_ref<T: Validate>(field: &str, config: &ConfigRef<T>) -> Result<(), ContractError> {
    match config {
        ConfigRef::Inline(inline) => inline
            .validate()
            .map_err(|errors| ContractError::config_validation(field, errors.to_string())),
        ConfigRef::Named(name) if name.trim().is_empty() => Err(ContractError::configuration(
            format!("{field} name must not be empty"),
        )),
        ConfigRef::Named(_) => Ok(()),
    }
}
