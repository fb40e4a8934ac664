//! Bounded retry with exponential backoff

use std::sync::Arc;
use std::time::Duration;

use contracts::{Decision, ErrorHandler, RawRecord, RecordFailure};
use tracing::{debug, warn};

use crate::StopOnErrorHandler;

/// Retries a failed record with exponential backoff
///
/// Attempt `n` (1-based) waits `initial_interval * coefficient^(n-1)`, capped
/// at `maximum_interval`. Once `max_attempts` attempts have failed, the
/// decision is delegated to the fallback (stop by default).
#[derive(Clone)]
pub struct RetryErrorHandler {
    max_attempts: u32,
    initial_interval: Duration,
    coefficient: f64,
    maximum_interval: Duration,
    handler_exceptions_only: bool,
    fallback: Arc<dyn ErrorHandler>,
}

impl RetryErrorHandler {
    /// Retry up to `max_attempts` attempts in total (100 ms initial, x2, max 10 s)
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::from_millis(100),
            coefficient: 2.0,
            maximum_interval: Duration::from_secs(10),
            handler_exceptions_only: false,
            fallback: Arc::new(StopOnErrorHandler),
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_coefficient(mut self, coefficient: f64) -> Self {
        self.coefficient = coefficient.max(1.0);
        self
    }

    pub fn with_maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = interval;
        self
    }

    /// Policy used once retries are exhausted
    pub fn with_fallback(mut self, fallback: impl ErrorHandler + 'static) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Hand deserialization failures straight to the fallback
    pub fn retry_handler_exceptions_only(mut self) -> Self {
        self.handler_exceptions_only = true;
        self
    }

    /// Backoff before re-delivering after failed attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_interval.as_millis() as f64 * self.coefficient.powi(exponent);
        let capped = millis.min(self.maximum_interval.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl std::fmt::Debug for RetryErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryErrorHandler")
            .field("max_attempts", &self.max_attempts)
            .field("initial_interval", &self.initial_interval)
            .field("coefficient", &self.coefficient)
            .field("maximum_interval", &self.maximum_interval)
            .field("handler_exceptions_only", &self.handler_exceptions_only)
            .finish_non_exhaustive()
    }
}

impl ErrorHandler for RetryErrorHandler {
    fn handle(&self, record: &RawRecord, failure: &RecordFailure) -> Decision {
        let retryable = !(self.handler_exceptions_only && failure.kind.is_deserialization());
        if retryable && failure.attempt < self.max_attempts {
            let backoff = self.backoff(failure.attempt);
            debug!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                attempt = failure.attempt,
                backoff_ms = backoff.as_millis() as u64,
                "retrying record"
            );
            return Decision::Retry(backoff);
        }
        if retryable {
            warn!(
                topic = %record.topic,
                offset = record.offset,
                attempts = failure.attempt,
                "retries exhausted"
            );
        }
        self.fallback.handle(record, failure)
    }
}
