//! ListenerConfig - polling cadence of a registration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Listener configuration
///
/// Shared read-only by every worker of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ListenerConfig {
    /// Upper bound a single poll blocks waiting for records (milliseconds)
    #[serde(default = "default_poll_timeout_ms")]
    #[validate(range(min = 1))]
    pub poll_timeout_ms: u64,

    /// Number of workers sharing the consumer group
    #[serde(default = "default_max_instances", alias = "instances")]
    #[validate(range(min = 1))]
    pub max_instances: usize,

    /// Maximum number of records returned by one poll
    #[serde(default = "default_max_poll_records")]
    #[validate(range(min = 1))]
    pub max_poll_records: usize,

    /// How long a graceful drain may take before workers are aborted (milliseconds)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Record headers copied into the dispatch context (case-insensitive)
    #[serde(default)]
    pub metadata_fields: Vec<String>,
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_max_instances() -> usize {
    1
}

fn default_max_poll_records() -> usize {
    500
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            max_instances: default_max_instances(),
            max_poll_records: default_max_poll_records(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            metadata_fields: Vec::new(),
        }
    }
}

impl ListenerConfig {
    /// Create a listener config with the given poll timeout and instance count
    pub fn new(poll_timeout: Duration, max_instances: usize) -> Self {
        Self {
            poll_timeout_ms: duration_to_ms(poll_timeout),
            max_instances,
            ..Default::default()
        }
    }

    pub fn with_max_poll_records(mut self, max_poll_records: usize) -> Self {
        self.max_poll_records = max_poll_records;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = duration_to_ms(timeout);
        self
    }

    pub fn with_metadata_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listener() {
        let config = ListenerConfig::default();
        assert_eq!(config.poll_timeout(), Duration::from_millis(100));
        assert_eq!(config.max_instances, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_instances_rejected() {
        let config = ListenerConfig::new(Duration::from_millis(50), 0);
        let err = config.validate().unwrap_err();
        assert!(err.field_errors().contains_key("max_instances"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ListenerConfig = serde_json::from_str(r#"{"instances": 3}"#).unwrap();
        assert_eq!(config.max_instances, 3);
        assert_eq!(config.poll_timeout_ms, 100);
        assert_eq!(config.max_poll_records, 500);
    }
}
