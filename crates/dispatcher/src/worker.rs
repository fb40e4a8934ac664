//! Worker - poll loop of one broker session

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use contracts::{
    BrokerConsumer, CommitMode, CommitOffset, CommitStrategy, ConsumerRecord, ContractError,
    Decision, DispatchContext, FailureKind, HandlerError, ListenerConfig, RawRecord,
    RecordFailure, RecordPart, TopicPartition,
};
use observability::RecordOutcome;
use registration::Registration;
use tokio::sync::watch;
use tokio::task::{self, JoinError};
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::WorkerMetrics;
use crate::state::{LifecycleState, WorkerPhase};

/// Why the poll loop ended
enum Exit {
    /// Shutdown requested (or the handle went away)
    Shutdown,
    /// The error handler decided to stop
    Stopped(String),
    /// Poll / commit / subscribe failed
    Broker(ContractError),
}

/// How a single record was resolved
enum Resolution {
    Processed,
    Skipped,
    Stop(RecordFailure),
    /// Shutdown arrived while waiting to retry
    Interrupted,
}

pub(crate) struct Worker<K, V, C> {
    pub(crate) id: usize,
    pub(crate) name: Arc<str>,
    pub(crate) registration: Arc<Registration<K, V>>,
    pub(crate) listener: Arc<ListenerConfig>,
    pub(crate) commit_strategy: CommitStrategy,
    pub(crate) consumer: C,
    pub(crate) metrics: Arc<WorkerMetrics>,
    pub(crate) state: Arc<watch::Sender<WorkerPhase>>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl<K, V, C> Worker<K, V, C>
where
    K: Send + 'static,
    V: Send + 'static,
    C: BrokerConsumer,
{
    #[instrument(
        name = "dispatch_worker",
        skip(self),
        fields(registration = %self.name, worker = self.id, client_id = %self.consumer.client_id())
    )]
    pub(crate) async fn run(mut self) {
        observability::record_worker_started(&self.name);

        let topics = self.registration.topic_names();
        let exit = match self.consumer.subscribe(&topics).await {
            Ok(()) => {
                self.state.send_if_modified(|phase| {
                    if phase.state == LifecycleState::Created {
                        phase.state = LifecycleState::Running;
                        true
                    } else {
                        false
                    }
                });
                info!(topics = topics.len(), "worker started");
                self.poll_loop().await
            }
            Err(e) => Exit::Broker(e),
        };

        if let Err(e) = self.consumer.close().await {
            warn!(error = %e, "failed to close consumer");
        }

        let phase = match exit {
            Exit::Shutdown => {
                info!("worker stopped");
                WorkerPhase::new(LifecycleState::Stopped)
            }
            Exit::Stopped(cause) => {
                error!(cause = %cause, "worker stopped by error handler");
                WorkerPhase::failed(cause)
            }
            Exit::Broker(e) => {
                error!(error = %e, "worker failed");
                WorkerPhase::failed(e.to_string())
            }
        };
        observability::record_worker_stopped(&self.name, phase.state == LifecycleState::Failed);
        self.state.send_replace(phase);
    }

    async fn poll_loop(&mut self) -> Exit {
        let timeout = self.listener.poll_timeout();
        let max_records = self.listener.max_poll_records;

        loop {
            if *self.shutdown.borrow() {
                return Exit::Shutdown;
            }

            let polled = tokio::select! {
                biased;
                _ = self.shutdown.changed() => return Exit::Shutdown,
                polled = self.consumer.poll(timeout, max_records) => polled,
            };
            let records = match polled {
                Ok(records) => records,
                Err(e) => return Exit::Broker(e),
            };
            if records.is_empty() {
                continue;
            }

            self.metrics.inc_batches(records.len());
            observability::record_poll_batch(&self.name, records.len());
            debug!(records = records.len(), "batch received");

            if let Err(exit) = self.process_batch(&records).await {
                return exit;
            }
        }
    }

    /// Dispatch a batch in order and commit according to the strategy
    ///
    /// On stop or interruption, records resolved so far are still committed
    /// so only the unresolved tail is redelivered.
    async fn process_batch(&mut self, records: &[RawRecord]) -> Result<(), Exit> {
        let mut resolved: BTreeMap<TopicPartition, i64> = BTreeMap::new();

        for record in records {
            match self.dispatch(record).await {
                Resolution::Processed | Resolution::Skipped => match self.commit_strategy {
                    CommitStrategy::SyncAfterRecord => {
                        let offset = CommitOffset::after(record.topic_partition(), record.offset);
                        self.commit(vec![offset]).await.map_err(Exit::Broker)?;
                    }
                    CommitStrategy::SyncAfterBatch => {
                        resolved.insert(record.topic_partition(), record.offset);
                    }
                    CommitStrategy::Auto => {
                        let offset = CommitOffset::after(record.topic_partition(), record.offset);
                        self.consumer
                            .store_offsets(&[offset])
                            .map_err(Exit::Broker)?;
                    }
                },
                Resolution::Stop(failure) => {
                    self.commit_resolved(resolved).await.map_err(Exit::Broker)?;
                    return Err(Exit::Stopped(format!(
                        "{failure} ({}@{})",
                        record.topic_partition(),
                        record.offset
                    )));
                }
                Resolution::Interrupted => {
                    self.commit_resolved(resolved).await.map_err(Exit::Broker)?;
                    return Err(Exit::Shutdown);
                }
            }
        }

        self.commit_resolved(resolved).await.map_err(Exit::Broker)
    }

    /// Hand one record to the handler until it is resolved
    async fn dispatch(&mut self, record: &RawRecord) -> Resolution {
        let mut attempt: u32 = 1;
        loop {
            let failure = match self.invoke(record, attempt).await {
                Ok(()) => {
                    self.metrics.inc_processed();
                    observability::record_record_outcome(
                        &self.name,
                        &record.topic,
                        RecordOutcome::Processed,
                    );
                    return Resolution::Processed;
                }
                Err(failure) => failure,
            };

            self.metrics.inc_failures();
            let decision = self.registration.error_handler().handle(record, &failure);
            observability::record_decision(&self.name, &decision);
            debug!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                attempt,
                decision = decision.as_str(),
                "error handler decided"
            );

            match decision {
                Decision::Continue => {
                    self.metrics.inc_skipped();
                    observability::record_record_outcome(
                        &self.name,
                        &record.topic,
                        RecordOutcome::Skipped,
                    );
                    return Resolution::Skipped;
                }
                Decision::Stop => {
                    observability::record_record_outcome(
                        &self.name,
                        &record.topic,
                        RecordOutcome::Stopped,
                    );
                    return Resolution::Stop(failure);
                }
                Decision::Retry(backoff) => {
                    self.metrics.inc_retries();
                    if *self.shutdown.borrow() {
                        return Resolution::Interrupted;
                    }
                    tokio::select! {
                        biased;
                        _ = self.shutdown.changed() => return Resolution::Interrupted,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    attempt = next_attempt(attempt);
                }
            }
        }
    }

    /// Deserialize and call the handler once
    ///
    /// The handler runs on the blocking pool; a slow handler only holds up
    /// this worker.
    async fn invoke(&mut self, record: &RawRecord, attempt: u32) -> Result<(), RecordFailure> {
        let topic = record.topic.as_str();
        let key = self
            .registration
            .key_deserializer()
            .deserialize(topic, record.key.as_deref())
            .map_err(|e| RecordFailure {
                kind: FailureKind::DeserializationFailure(RecordPart::Key),
                message: e.message().to_string(),
                attempt,
            })?;
        let value = self
            .registration
            .value_deserializer()
            .deserialize(topic, record.payload.as_deref())
            .map_err(|e| RecordFailure {
                kind: FailureKind::DeserializationFailure(RecordPart::Value),
                message: e.message().to_string(),
                attempt,
            })?;

        let consumer_record = ConsumerRecord::from_raw(record, key, value);
        let context = DispatchContext::for_record(
            Arc::clone(&self.name),
            self.id,
            attempt,
            record,
            &self.listener.metadata_fields,
        );

        let handler = Arc::clone(self.registration.handler());
        let started = Instant::now();
        let result = task::spawn_blocking(move || handler.handle(&consumer_record, &context))
            .await
            .unwrap_or_else(|e| Err(HandlerError::new(join_failure(e))));
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.observe_handler_ms(elapsed_ms);
        observability::record_handler_duration_ms(&self.name, elapsed_ms);

        result.map_err(|e| RecordFailure {
            kind: FailureKind::HandlerException,
            message: e.message().to_string(),
            attempt,
        })
    }

    async fn commit_resolved(
        &mut self,
        resolved: BTreeMap<TopicPartition, i64>,
    ) -> Result<(), ContractError> {
        if resolved.is_empty() || self.commit_strategy != CommitStrategy::SyncAfterBatch {
            return Ok(());
        }
        let offsets = resolved
            .into_iter()
            .map(|(partition, offset)| CommitOffset::after(partition, offset))
            .collect();
        self.commit(offsets).await
    }

    async fn commit(&mut self, offsets: Vec<CommitOffset>) -> Result<(), ContractError> {
        match self.consumer.commit(&offsets, CommitMode::Sync).await {
            Ok(()) => {
                self.metrics.inc_commits();
                observability::record_commit(&self.name, offsets.len(), true);
                debug!(offsets = ?offsets, "offsets committed");
                Ok(())
            }
            Err(e) => {
                observability::record_commit(&self.name, offsets.len(), false);
                Err(e)
            }
        }
    }
}

/// Retries are unbounded, so the counter sticks at `u32::MAX`
fn next_attempt(attempt: u32) -> u32 {
    attempt.saturating_add(1)
}

fn join_failure(e: JoinError) -> String {
    if e.is_panic() {
        panic_message(e.into_panic().as_ref())
    } else {
        format!("handler task failed: {e}")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string payload".to_string());
    format!("handler panicked: {detail}")
}
