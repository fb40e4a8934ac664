//! Configuration validation
//!
//! Rules:
//! - field rules declared on the models (`validator` derive)
//! - broker addresses are non-empty
//! - metadata field names are non-empty
//! - two logical topic names mapping to the same broker topic must agree

use std::collections::HashMap;

use contracts::{ContractError, ExpectedTopicConfiguration, KafkaSettings};
use validator::Validate;

/// Validate `KafkaSettings`
///
/// Returns the first error encountered.
pub fn validate(settings: &KafkaSettings) -> Result<(), ContractError> {
    validate_brokers(settings)?;
    validate_listeners(settings)?;
    validate_consumers(settings)?;
    validate_topics(settings)?;
    Ok(())
}

fn validate_brokers(settings: &KafkaSettings) -> Result<(), ContractError> {
    for (idx, broker) in settings.brokers.iter().enumerate() {
        if broker.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("brokers[{idx}]"),
                "broker address cannot be empty",
            ));
        }
    }
    Ok(())
}

fn validate_listeners(settings: &KafkaSettings) -> Result<(), ContractError> {
    for (name, listener) in &settings.listeners {
        check_fields(&format!("listeners.{name}"), listener)?;
        if listener.metadata_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(ContractError::config_validation(
                format!("listeners.{name}.metadata_fields"),
                "metadata field name cannot be empty",
            ));
        }
    }
    Ok(())
}

fn validate_consumers(settings: &KafkaSettings) -> Result<(), ContractError> {
    for (name, consumer) in &settings.consumers {
        check_fields(&format!("consumers.{name}"), consumer)?;
    }
    Ok(())
}

fn validate_topics(settings: &KafkaSettings) -> Result<(), ContractError> {
    let mut by_topic: HashMap<&str, (&str, &ExpectedTopicConfiguration)> = HashMap::new();
    for (name, topic) in &settings.topics {
        check_fields(&format!("topics.{name}"), topic)?;
        if let Some((other, previous)) = by_topic.insert(&topic.topic_name, (name, topic)) {
            if previous != topic {
                return Err(ContractError::config_validation(
                    format!("topics.{name}"),
                    format!(
                        "conflicting expectations for topic '{}' (also declared as '{other}')",
                        topic.topic_name
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Run the derive rules of `value`, reporting failing fields under `path`
pub(crate) fn check_fields<T: Validate>(path: &str, value: &T) -> Result<(), ContractError> {
    value.validate().map_err(|errors| {
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        fields.sort();
        ContractError::config_validation(format!("{path}.{}", fields.join(",")), errors.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ConsumerConfig, ListenerConfig};

    fn minimal_settings() -> KafkaSettings {
        let mut settings = KafkaSettings {
            brokers: vec!["localhost:9092".into()],
            ..Default::default()
        };
        settings
            .listeners
            .insert("default".into(), ListenerConfig::default());
        settings
            .consumers
            .insert("default".into(), ConsumerConfig::default());
        settings.topics.insert(
            "orders".into(),
            ExpectedTopicConfiguration::builder("orders")
                .with_partition_count(3)
                .build(),
        );
        settings
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_settings()).is_ok());
    }

    #[test]
    fn test_empty_broker() {
        let mut settings = minimal_settings();
        settings.brokers.push("  ".into());
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("brokers[1]"), "got: {err}");
    }

    #[test]
    fn test_zero_instances() {
        let mut settings = minimal_settings();
        settings.listeners.get_mut("default").unwrap().max_instances = 0;
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("listeners.default.max_instances"), "got: {err}");
    }

    #[test]
    fn test_empty_group() {
        let mut settings = minimal_settings();
        settings.consumers.get_mut("default").unwrap().group_id = String::new();
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("consumers.default.group_id"), "got: {err}");
    }

    #[test]
    fn test_empty_metadata_field() {
        let mut settings = minimal_settings();
        settings.listeners.get_mut("default").unwrap().metadata_fields = vec![String::new()];
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_conflicting_topic_aliases() {
        let mut settings = minimal_settings();
        settings.topics.insert(
            "orders_alias".into(),
            ExpectedTopicConfiguration::builder("orders")
                .with_partition_count(6)
                .build(),
        );
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("conflicting expectations"), "got: {err}");
    }

    #[test]
    fn test_identical_topic_aliases_allowed() {
        let mut settings = minimal_settings();
        let same = settings.topics["orders"].clone();
        settings.topics.insert("orders_alias".into(), same);
        assert!(validate(&settings).is_ok());
    }
}
