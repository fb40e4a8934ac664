//! Worker metrics for status reports

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use observability::{RunningStats, StatsSummary};

/// Metrics for a single worker
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Polls that returned at least one record
    batches: AtomicU64,
    /// Records received from the broker (redeliveries included)
    records_received: AtomicU64,
    /// Records the handler accepted
    records_processed: AtomicU64,
    /// Failed records skipped by the error handler
    records_skipped: AtomicU64,
    /// Deserialization or handler failures (every attempt)
    failures: AtomicU64,
    retries: AtomicU64,
    commits: AtomicU64,
    handler_latency_ms: Mutex<RunningStats>,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn inc_batches(&self, records: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.records_received
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn records_received(&self) -> u64 {
        self.records_received.load(Ordering::Relaxed)
    }

    pub fn records_processed(&self) -> u64 {
        self.records_processed.load(Ordering::Relaxed)
    }

    pub fn inc_processed(&self) {
        self.records_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_skipped(&self) -> u64 {
        self.records_skipped.load(Ordering::Relaxed)
    }

    pub fn inc_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn inc_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_handler_ms(&self, millis: f64) {
        self.handler_latency_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(millis);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            batches: self.batches(),
            records_received: self.records_received(),
            records_processed: self.records_processed(),
            records_skipped: self.records_skipped(),
            failures: self.failures(),
            retries: self.retries(),
            commits: self.commits(),
            handler_latency_ms: self
                .handler_latency_ms
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .summary(),
        }
    }
}

/// Snapshot of worker metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorkerMetricsSnapshot {
    pub batches: u64,
    pub records_received: u64,
    pub records_processed: u64,
    pub records_skipped: u64,
    pub failures: u64,
    pub retries: u64,
    pub commits: u64,
    pub handler_latency_ms: StatsSummary,
}
