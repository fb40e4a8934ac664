//! Handles to running registrations and their workers

use std::sync::Arc;
use std::time::Duration;

use contracts::{BrokerConsumer, CommitStrategy, ListenerConfig};
use registration::Registration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::metrics::WorkerMetrics;
use crate::state::{LifecycleState, RegistrationStatus, WorkerPhase, WorkerStatus};
use crate::worker::Worker;

/// Handle to one running worker task
#[derive(Debug)]
pub struct WorkerHandle {
    id: usize,
    client_id: String,
    registration: Arc<str>,
    metrics: Arc<WorkerMetrics>,
    state: Arc<watch::Sender<WorkerPhase>>,
    shutdown_tx: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn the worker task owning `consumer`
    pub(crate) fn spawn<K, V, C>(
        id: usize,
        registration: Arc<Registration<K, V>>,
        listener: Arc<ListenerConfig>,
        commit_strategy: CommitStrategy,
        consumer: C,
    ) -> Self
    where
        K: Send + 'static,
        V: Send + 'static,
        C: BrokerConsumer + 'static,
    {
        let client_id = consumer.client_id().to_string();
        let name = Arc::clone(registration.name());
        let metrics = Arc::new(WorkerMetrics::new());
        let (state_tx, _) = watch::channel(WorkerPhase::new(LifecycleState::Created));
        let state = Arc::new(state_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Worker {
            id,
            name: Arc::clone(&name),
            registration,
            listener,
            commit_strategy,
            consumer,
            metrics: Arc::clone(&metrics),
            state: Arc::clone(&state),
            shutdown: shutdown_rx,
        };
        let join = tokio::spawn(worker.run());

        Self {
            id,
            client_id,
            registration: name,
            metrics,
            state,
            shutdown_tx,
            join: Some(join),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    pub fn state(&self) -> LifecycleState {
        self.state.borrow().state
    }

    pub fn status(&self) -> WorkerStatus {
        let phase = self.state.borrow().clone();
        WorkerStatus {
            id: self.id,
            client_id: self.client_id.clone(),
            state: phase.state,
            failure: phase.failure,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Subscribe to state changes
    pub fn watch(&self) -> watch::Receiver<WorkerPhase> {
        self.state.subscribe()
    }

    /// Wait until the worker reaches `target` or a terminal state
    pub async fn wait_for_state(&self, target: LifecycleState) -> LifecycleState {
        let mut rx = self.state.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let state = match rx
            .wait_for(|phase| phase.state == target || phase.state.is_terminal())
            .await
        {
            Ok(phase) => phase.state,
            Err(_) => self.state(),
        };
        state
    }

    /// Ask the worker to finish its current batch and stop
    pub(crate) fn request_stop(&self) {
        self.shutdown_tx.send_replace(true);
        self.transition(WorkerPhase::new(LifecycleState::Draining));
    }

    /// Wait for the worker until `deadline`, then abort it
    pub(crate) async fn join(&mut self, deadline: Instant) {
        let Some(mut join) = self.join.take() else {
            return;
        };
        match tokio::time::timeout_at(deadline, &mut join).await {
            Ok(Ok(())) => debug!(client_id = %self.client_id, "worker joined"),
            Ok(Err(e)) => self.task_failed(e),
            Err(_) => {
                warn!(client_id = %self.client_id, "drain timed out, aborting worker");
                self.abort_task(join).await;
            }
        }
    }

    /// Abort without draining; uncommitted records are redelivered
    pub(crate) async fn abort(&mut self) {
        if let Some(join) = self.join.take() {
            self.abort_task(join).await;
        }
    }

    async fn abort_task(&self, join: JoinHandle<()>) {
        join.abort();
        match join.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                if self.transition(WorkerPhase::new(LifecycleState::Stopped)) {
                    observability::record_worker_stopped(&self.registration, false);
                }
            }
            Err(e) => self.task_failed(e),
        }
    }

    fn task_failed(&self, e: tokio::task::JoinError) {
        error!(client_id = %self.client_id, error = %e, "worker task panicked");
        if self.transition(WorkerPhase::failed(format!("worker task panicked: {e}"))) {
            observability::record_worker_stopped(&self.registration, true);
        }
    }

    /// Move to `phase` unless already terminal
    fn transition(&self, phase: WorkerPhase) -> bool {
        self.state.send_if_modified(|current| {
            if current.state.is_terminal() {
                false
            } else {
                *current = phase;
                true
            }
        })
    }
}

/// Handle to one submitted registration
#[derive(Debug)]
pub struct ListenerHandle {
    name: Arc<str>,
    /// State before workers exist (validation outcome)
    state: LifecycleState,
    failure: Option<String>,
    shutdown_timeout: Duration,
    workers: Vec<WorkerHandle>,
}

impl ListenerHandle {
    pub(crate) fn running(
        name: Arc<str>,
        shutdown_timeout: Duration,
        workers: Vec<WorkerHandle>,
    ) -> Self {
        Self {
            name,
            state: LifecycleState::Running,
            failure: None,
            shutdown_timeout,
            workers,
        }
    }

    /// Registration rejected before any worker started
    pub(crate) fn failed(name: Arc<str>, cause: impl Into<String>) -> Self {
        Self {
            name,
            state: LifecycleState::Failed,
            failure: Some(cause.into()),
            shutdown_timeout: Duration::ZERO,
            workers: Vec::new(),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn status(&self) -> RegistrationStatus {
        let workers: Vec<WorkerStatus> = self.workers.iter().map(WorkerHandle::status).collect();
        let state = if workers.is_empty() {
            self.state
        } else {
            RegistrationStatus::aggregate(&workers)
        };
        RegistrationStatus {
            name: Arc::clone(&self.name),
            state,
            failure: self.failure.clone(),
            workers,
        }
    }

    /// Wait until every worker has stopped or failed
    pub async fn wait_until_terminal(&self) {
        for worker in &self.workers {
            worker.wait_for_state(LifecycleState::Stopped).await;
        }
    }

    pub(crate) fn request_stop(&self) {
        for worker in &self.workers {
            worker.request_stop();
        }
    }

    pub(crate) async fn join(&mut self, deadline: Instant) {
        for worker in &mut self.workers {
            worker.join(deadline).await;
        }
    }

    /// Drain all workers, forcing them after the shutdown timeout
    #[instrument(name = "listener_handle_shutdown", skip(self), fields(registration = %self.name))]
    pub async fn shutdown(mut self) -> RegistrationStatus {
        self.request_stop();
        self.join(Instant::now() + self.shutdown_timeout).await;
        self.status()
    }

    /// Abort all workers immediately
    #[instrument(name = "listener_handle_shutdown_now", skip(self), fields(registration = %self.name))]
    pub async fn shutdown_now(mut self) -> RegistrationStatus {
        for worker in &mut self.workers {
            worker.abort().await;
        }
        self.status()
    }

    pub(crate) fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}
