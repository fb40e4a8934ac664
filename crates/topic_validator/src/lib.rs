//! # Topic Validator
//!
//! Compares declared topic expectations with live broker metadata before a
//! registration is allowed to start consuming.
//!
//! Every expectation is checked and every difference is reported, so a single
//! startup failure lists all misconfigured topics at once.

use contracts::{
    ContractError, ExpectedTopicConfiguration, TopicDescription, TopicMetadata, TopicMismatch,
};
use tracing::{debug, instrument, warn};

/// Outcome of validating a set of expectations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Number of topics checked
    pub checked: usize,
    pub mismatches: Vec<TopicMismatch>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// `Err(ContractError::TopicMismatch)` listing every mismatch, if any
    pub fn into_result(self) -> Result<(), ContractError> {
        if self.mismatches.is_empty() {
            Ok(())
        } else {
            Err(ContractError::TopicMismatch {
                mismatches: self.mismatches,
            })
        }
    }
}

/// Query `metadata` for every expectation and collect all mismatches
///
/// # Errors
/// Returns `BrokerConnectivity` if a metadata query fails; mismatches are
/// reported in the `ValidationResult`, not as an error.
#[instrument(name = "topic_validator_validate", skip_all, fields(topics = expectations.len()))]
pub async fn validate<M: TopicMetadata>(
    expectations: &[ExpectedTopicConfiguration],
    metadata: &M,
) -> Result<ValidationResult, ContractError> {
    let mut result = ValidationResult::default();
    for expected in expectations {
        let actual = metadata.describe_topic(&expected.topic_name).await?;
        let mismatches = compare(expected, actual.as_ref());
        if mismatches.is_empty() {
            debug!(topic = %expected.topic_name, "topic matches expectation");
        } else {
            warn!(
                topic = %expected.topic_name,
                mismatches = mismatches.len(),
                "topic does not match expectation"
            );
        }
        result.checked += 1;
        result.mismatches.extend(mismatches);
    }
    Ok(result)
}

/// Differences between one expectation and the live topic (`None` = missing)
///
/// Unset expectations (`partition_count`, `replication_factor`) are not
/// checked; only the expected config keys are compared.
pub fn compare(
    expected: &ExpectedTopicConfiguration,
    actual: Option<&TopicDescription>,
) -> Vec<TopicMismatch> {
    let topic = &expected.topic_name;
    let Some(actual) = actual else {
        return vec![TopicMismatch::MissingTopic {
            topic: topic.clone(),
        }];
    };

    let mut mismatches = Vec::new();
    if let Some(count) = expected.partition_count {
        if count != actual.partition_count {
            mismatches.push(TopicMismatch::PartitionCount {
                topic: topic.clone(),
                expected: count,
                actual: actual.partition_count,
            });
        }
    }
    if let Some(factor) = expected.replication_factor {
        if factor != actual.replication_factor {
            mismatches.push(TopicMismatch::ReplicationFactor {
                topic: topic.clone(),
                expected: factor,
                actual: actual.replication_factor,
            });
        }
    }
    for (key, value) in &expected.config_entries {
        let live = actual.config_entries.get(key);
        if live != Some(value) {
            mismatches.push(TopicMismatch::ConfigEntry {
                topic: topic.clone(),
                key: key.clone(),
                expected: value.clone(),
                actual: live.cloned(),
            });
        }
    }
    mismatches
}
