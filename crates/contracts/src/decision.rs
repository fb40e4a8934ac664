//! Error-handler decisions and dispatch context

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::{RawRecord, TopicName};

/// Outcome of an error handler for a failed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Skip the record; its offset counts as processed
    Continue,
    /// Terminate this worker; the failing offset is not committed
    Stop,
    /// Re-deliver the same record after the given backoff
    Retry(Duration),
}

impl Decision {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Stop => "stop",
            Self::Retry(_) => "retry",
        }
    }
}

/// Which part of a record failed to deserialize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPart {
    Key,
    Value,
}

impl fmt::Display for RecordPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key => f.write_str("key"),
            Self::Value => f.write_str("value"),
        }
    }
}

/// Kind of per-record failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The message handler returned an error
    HandlerException,
    /// Key or value bytes could not be deserialized
    DeserializationFailure(RecordPart),
}

impl FailureKind {
    pub fn is_deserialization(&self) -> bool {
        matches!(self, Self::DeserializationFailure(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HandlerException => "handler_exception",
            Self::DeserializationFailure(_) => "deserialization_failure",
        }
    }
}

/// Failure handed to an [`ErrorHandler`](crate::ErrorHandler)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub kind: FailureKind,
    pub message: String,
    /// 1-based attempt number of the current record
    pub attempt: u32,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::HandlerException => write!(f, "handler failed: {}", self.message),
            FailureKind::DeserializationFailure(part) => {
                write!(f, "{part} deserialization failed: {}", self.message)
            }
        }
    }
}

/// Context passed explicitly to every handler invocation
///
/// Carries what would otherwise live in thread-local state: which registration
/// and worker is dispatching, the attempt number and the metadata headers
/// selected by `ListenerConfig::metadata_fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchContext {
    pub registration: Arc<str>,
    pub worker: usize,
    pub topic: TopicName,
    pub partition: i32,
    pub offset: i64,
    pub attempt: u32,
    /// Lower-cased header name -> values in record order
    pub metadata: BTreeMap<String, Vec<String>>,
}

impl DispatchContext {
    /// Build the context for `record`, extracting the configured metadata fields
    pub fn for_record(
        registration: Arc<str>,
        worker: usize,
        attempt: u32,
        record: &RawRecord,
        metadata_fields: &[String],
    ) -> Self {
        let mut metadata = BTreeMap::new();
        for field in metadata_fields {
            let values: Vec<String> = record
                .header_values(field)
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .collect();
            if !values.is_empty() {
                metadata.insert(field.to_ascii_lowercase(), values);
            }
        }
        Self {
            registration,
            worker,
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            attempt,
            metadata,
        }
    }

    /// First metadata value of `field` (case-insensitive)
    pub fn metadata_value(&self, field: &str) -> Option<&str> {
        self.metadata
            .get(&field.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordHeader;

    #[test]
    fn test_context_extracts_configured_headers_only() {
        let record = RawRecord {
            topic: "orders".into(),
            partition: 0,
            offset: 7,
            key: None,
            payload: None,
            timestamp: None,
            headers: vec![
                RecordHeader::new("Business-Process-Id", "bp-1"),
                RecordHeader::new("ignored", "x"),
            ],
        };
        let ctx = DispatchContext::for_record(
            Arc::from("orders-listener"),
            0,
            1,
            &record,
            &["business-process-id".to_string(), "tenant-id".to_string()],
        );
        assert_eq!(ctx.metadata_value("BUSINESS-PROCESS-ID"), Some("bp-1"));
        assert_eq!(ctx.metadata_value("tenant-id"), None);
        assert_eq!(ctx.metadata.len(), 1);
        assert_eq!(ctx.topic, "orders");
        assert_eq!(ctx.offset, 7);
    }

    #[test]
    fn test_failure_display() {
        let failure = RecordFailure {
            kind: FailureKind::DeserializationFailure(RecordPart::Value),
            message: "expected value".into(),
            attempt: 1,
        };
        assert_eq!(
            failure.to_string(),
            "value deserialization failed: expected value"
        );
        assert!(failure.kind.is_deserialization());
    }
}
