//! Lifecycle states and status reports

use std::fmt;
use std::sync::Arc;

use crate::metrics::WorkerMetricsSnapshot;

/// Lifecycle of a registration and of each of its workers
///
/// `Created -> Validating -> Running -> Draining -> Stopped`; `Failed` is
/// terminal and reached from `Validating` (topic mismatch) or `Running`
/// (stop decision, broker failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Validating,
    Running,
    Draining,
    Stopped,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Validating => "validating",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value published on a worker's state channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPhase {
    pub state: LifecycleState,
    /// Cause of `Failed`
    pub failure: Option<String>,
}

impl WorkerPhase {
    pub(crate) fn new(state: LifecycleState) -> Self {
        Self {
            state,
            failure: None,
        }
    }

    pub(crate) fn failed(cause: impl Into<String>) -> Self {
        Self {
            state: LifecycleState::Failed,
            failure: Some(cause.into()),
        }
    }
}

/// Point-in-time view of one worker
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub id: usize,
    pub client_id: String,
    pub state: LifecycleState,
    pub failure: Option<String>,
    pub metrics: WorkerMetricsSnapshot,
}

/// Point-in-time view of one registration
#[derive(Debug, Clone)]
pub struct RegistrationStatus {
    pub name: Arc<str>,
    pub state: LifecycleState,
    /// Cause when the registration failed before any worker started
    pub failure: Option<String>,
    pub workers: Vec<WorkerStatus>,
}

impl RegistrationStatus {
    /// Aggregate state over the workers
    ///
    /// Running while any worker runs; once all workers are terminal, Failed
    /// if any of them failed.
    pub(crate) fn aggregate(workers: &[WorkerStatus]) -> LifecycleState {
        if workers.iter().any(|w| w.state == LifecycleState::Draining) {
            LifecycleState::Draining
        } else if workers.iter().any(|w| !w.state.is_terminal()) {
            LifecycleState::Running
        } else if workers.iter().any(|w| w.state == LifecycleState::Failed) {
            LifecycleState::Failed
        } else {
            LifecycleState::Stopped
        }
    }

    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerStatus> {
        self.workers
            .iter()
            .filter(|w| w.state == LifecycleState::Failed)
    }
}
