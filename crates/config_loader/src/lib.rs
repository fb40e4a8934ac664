//! # Config Loader
//!
//! Loads the external configuration of the consumer engine.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate named listener / consumer / topic entries
//! - Produce `KafkaSettings`, against which registrations resolve names
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let settings = ConfigLoader::load_from_path(Path::new("kafka.toml")).unwrap();
//! let orders = settings.topic("orders").unwrap();
//! println!("topic: {}", orders.topic_name);
//! ```

mod parser;
mod validator;

pub use contracts::KafkaSettings;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<KafkaSettings, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<KafkaSettings, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Serialize settings to TOML string
    pub fn to_toml(settings: &KafkaSettings) -> Result<String, ContractError> {
        toml::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize settings to JSON string
    pub fn to_json(settings: &KafkaSettings) -> Result<String, ContractError> {
        serde_json::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<KafkaSettings, ContractError> {
        let settings = parser::parse(content, format)?;
        validator::validate(&settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::CommitStrategy;
    use std::io::Write;

    const EXAMPLE_TOML: &str = r#"
brokers = ["localhost:9092"]

[listeners.example1]
poll_timeout_ms = 1000
instances = 2

[consumers.consumerConfigExample]
group = "example-group"
client_id = "example"
commit_strategy = "sync_after_record"

[consumers.consumerConfigExample.config]
"auto.offset.reset" = "earliest"

[topics.example0]
name = "exampleTopic"
partitions = 2

[topics.example0.config]
"cleanup.policy" = "delete"

[topics.example1]
name = "exampleTopicLongs"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(EXAMPLE_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let settings = result.unwrap();

        let listener = settings.listener("example1").unwrap();
        assert_eq!(listener.max_instances, 2);
        assert_eq!(listener.poll_timeout_ms, 1000);

        let consumer = settings.consumer("consumerConfigExample").unwrap();
        assert_eq!(consumer.group_id, "example-group");
        assert_eq!(consumer.commit_strategy, CommitStrategy::SyncAfterRecord);
        assert_eq!(consumer.properties["bootstrap.servers"], "localhost:9092");

        let topic = settings.topic("example0").unwrap();
        assert_eq!(topic.topic_name, "exampleTopic");
        assert_eq!(topic.partition_count, Some(2));
        assert_eq!(topic.config_entries["cleanup.policy"], "delete");
    }

    #[test]
    fn test_round_trip_toml() {
        let settings = ConfigLoader::load_from_str(EXAMPLE_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&settings).unwrap();
        let reloaded = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(settings, reloaded);
    }

    #[test]
    fn test_round_trip_json() {
        let settings = ConfigLoader::load_from_str(EXAMPLE_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&settings).unwrap();
        let reloaded = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(settings.topics, reloaded.topics);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(EXAMPLE_TOML.as_bytes()).unwrap();
        let settings = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(settings.topics.len(), 2);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"), "got: {err}");
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[listeners.broken]
instances = 0
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("listeners.broken"));
    }
}
