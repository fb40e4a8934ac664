//! # Error Policies
//!
//! Built-in `ErrorHandler` implementations.
//!
//! - `StopOnErrorHandler`: log and stop the worker (registration default)
//! - `IgnoreAndProceedErrorHandler`: log and skip the record
//! - `RetryErrorHandler`: exponential backoff, then a fallback policy
//!
//! Any `Fn(&RawRecord, &RecordFailure) -> Decision` closure is an error
//! handler as well.

mod retry;

pub use retry::RetryErrorHandler;

use contracts::{Decision, ErrorHandler, RawRecord, RecordFailure};
use tracing::{error, warn};

/// Logs the failure and continues with the next record
///
/// The failed record's offset counts as processed and is committed.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreAndProceedErrorHandler;

impl ErrorHandler for IgnoreAndProceedErrorHandler {
    fn handle(&self, record: &RawRecord, failure: &RecordFailure) -> Decision {
        warn!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            kind = failure.kind.as_str(),
            error = %failure,
            "skipping record"
        );
        Decision::Continue
    }
}

/// Logs the failure and stops the worker
#[derive(Debug, Default, Clone, Copy)]
pub struct StopOnErrorHandler;

impl ErrorHandler for StopOnErrorHandler {
    fn handle(&self, record: &RawRecord, failure: &RecordFailure) -> Decision {
        error!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            kind = failure.kind.as_str(),
            error = %failure,
            "stopping worker on failed record"
        );
        Decision::Stop
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use contracts::{FailureKind, RawRecord, RecordFailure, RecordPart};

    pub fn record() -> RawRecord {
        RawRecord {
            topic: "orders".into(),
            partition: 0,
            offset: 42,
            key: None,
            payload: Some(bytes::Bytes::from_static(b"{")),
            timestamp: None,
            headers: Vec::new(),
        }
    }

    pub fn handler_failure(attempt: u32) -> RecordFailure {
        RecordFailure {
            kind: FailureKind::HandlerException,
            message: "boom".into(),
            attempt,
        }
    }

    pub fn value_failure(attempt: u32) -> RecordFailure {
        RecordFailure {
            kind: FailureKind::DeserializationFailure(RecordPart::Value),
            message: "EOF while parsing".into(),
            attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_ignore_continues() {
        let handler = IgnoreAndProceedErrorHandler;
        assert_eq!(handler.handle(&record(), &handler_failure(1)), Decision::Continue);
        assert_eq!(handler.handle(&record(), &value_failure(1)), Decision::Continue);
    }

    #[test]
    fn test_stop_stops() {
        let handler = StopOnErrorHandler;
        assert_eq!(handler.handle(&record(), &handler_failure(1)), Decision::Stop);
    }

    #[test]
    fn test_closure_is_error_handler() {
        let handler = |_: &RawRecord, failure: &RecordFailure| {
            if failure.kind.is_deserialization() {
                Decision::Continue
            } else {
                Decision::Stop
            }
        };
        let handler: &dyn ErrorHandler = &handler;
        assert_eq!(handler.handle(&record(), &value_failure(1)), Decision::Continue);
        assert_eq!(handler.handle(&record(), &handler_failure(1)), Decision::Stop);
    }
}
