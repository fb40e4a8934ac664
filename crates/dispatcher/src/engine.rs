//! DispatchEngine - turns registrations into running workers

use std::sync::Arc;

use contracts::{
    ConsumerConfig, ConsumerFactory, ContractError, KafkaSettings, ListenerConfig, TopicMetadata,
};
use registration::Registration;
use tokio::time::Instant;
use topic_validator::ValidationResult;
use tracing::{debug, error, info, instrument};
use validator::Validate;

use crate::error::DispatcherError;
use crate::handle::{ListenerHandle, WorkerHandle};
use crate::state::{LifecycleState, RegistrationStatus};

/// The dispatch engine
///
/// Owns every submitted registration. Workers of one registration share its
/// consumer group; each worker exclusively owns one broker session created by
/// the `ConsumerFactory`.
pub struct DispatchEngine<F, M> {
    factory: F,
    metadata: M,
    settings: Option<KafkaSettings>,
    listeners: Vec<ListenerHandle>,
}

impl<F, M> DispatchEngine<F, M>
where
    F: ConsumerFactory,
    M: TopicMetadata,
{
    pub fn new(factory: F, metadata: M) -> Self {
        Self {
            factory,
            metadata,
            settings: None,
            listeners: Vec::new(),
        }
    }

    /// External configuration used to resolve named configs
    ///
    /// Its brokers and global properties are applied to every consumer.
    pub fn with_settings(mut self, settings: KafkaSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn settings(&self) -> Option<&KafkaSettings> {
        self.settings.as_ref()
    }

    /// Validate and start a registration
    ///
    /// Topic validation (when enabled) runs before this returns; on mismatch
    /// no worker is created and the registration is reported as failed.
    ///
    /// # Errors
    /// - `Configuration` / `ConfigValidation`: unknown or invalid configs
    /// - `TopicMismatch`: live topics differ from the expectations
    /// - `BrokerConnectivity`: metadata query or consumer creation failed
    /// - `DuplicateRegistration`: a registration with this name is still active
    #[instrument(
        name = "dispatch_engine_submit",
        skip(self, registration),
        fields(registration = %registration.name())
    )]
    pub async fn submit<K, V>(
        &mut self,
        registration: Registration<K, V>,
    ) -> Result<&ListenerHandle, DispatcherError>
    where
        K: Send + 'static,
        V: Send + 'static,
    {
        let name = Arc::clone(registration.name());
        self.evict_finished(&name).await?;

        let (listener, consumer) = self.resolve_configs(&registration)?;

        if registration.check_topic_configuration() {
            debug!(
                state = %LifecycleState::Validating,
                topics = registration.topics().len(),
                "validating topics"
            );
            let outcome = topic_validator::validate(registration.topics(), &self.metadata)
                .await
                .and_then(ValidationResult::into_result);
            if let Err(e) = outcome {
                error!(error = %e, "topic validation failed");
                self.listeners
                    .push(ListenerHandle::failed(Arc::clone(&name), e.to_string()));
                return Err(e.into());
            }
        }

        let mut sessions = Vec::with_capacity(listener.max_instances);
        for instance in 0..listener.max_instances {
            let client_id = consumer.client_id(instance);
            sessions.push(self.factory.create_consumer(&consumer, &client_id)?);
        }

        let registration = Arc::new(registration);
        let shutdown_timeout = listener.shutdown_timeout();
        let listener = Arc::new(listener);
        let workers: Vec<WorkerHandle> = sessions
            .into_iter()
            .enumerate()
            .map(|(id, session)| {
                WorkerHandle::spawn(
                    id,
                    Arc::clone(&registration),
                    Arc::clone(&listener),
                    consumer.commit_strategy,
                    session,
                )
            })
            .collect();

        info!(
            workers = workers.len(),
            group_id = %consumer.group_id,
            commit_strategy = ?consumer.commit_strategy,
            "registration running"
        );

        let index = self.listeners.len();
        self.listeners
            .push(ListenerHandle::running(name, shutdown_timeout, workers));
        Ok(&self.listeners[index])
    }

    pub fn listener(&self, name: &str) -> Option<&ListenerHandle> {
        self.listeners.iter().find(|l| l.name().as_ref() == name)
    }

    pub fn listeners(&self) -> &[ListenerHandle] {
        &self.listeners
    }

    /// Status of every registration, without stopping anything
    pub fn status(&self) -> Vec<RegistrationStatus> {
        self.listeners.iter().map(ListenerHandle::status).collect()
    }

    /// Drain every registration
    ///
    /// Workers finish their current batch and commit; workers still busy
    /// after their registration's shutdown timeout are aborted.
    #[instrument(name = "dispatch_engine_shutdown", skip(self), fields(registrations = self.listeners.len()))]
    pub async fn shutdown(mut self) -> Vec<RegistrationStatus> {
        let requested = Instant::now();
        for listener in &self.listeners {
            listener.request_stop();
        }
        for listener in &mut self.listeners {
            let deadline = requested + listener.shutdown_timeout();
            listener.join(deadline).await;
        }
        info!("dispatch engine stopped");
        self.status()
    }

    /// Abort every worker without draining
    #[instrument(name = "dispatch_engine_shutdown_now", skip(self))]
    pub async fn shutdown_now(self) -> Vec<RegistrationStatus> {
        let mut statuses = Vec::with_capacity(self.listeners.len());
        for listener in self.listeners {
            statuses.push(listener.shutdown_now().await);
        }
        info!("dispatch engine aborted");
        statuses
    }

    /// Drop a finished registration with the same name so it can be
    /// submitted again
    async fn evict_finished(&mut self, name: &str) -> Result<(), DispatcherError> {
        let Some(index) = self.listeners.iter().position(|l| l.name().as_ref() == name) else {
            return Ok(());
        };
        if !self.listeners[index].status().state.is_terminal() {
            return Err(DispatcherError::duplicate(name));
        }
        let previous = self.listeners.remove(index);
        previous.shutdown_now().await;
        debug!(registration = %name, "replacing finished registration");
        Ok(())
    }

    fn resolve_configs<K, V>(
        &self,
        registration: &Registration<K, V>,
    ) -> Result<(ListenerConfig, ConsumerConfig), ContractError> {
        let listener = registration
            .listener_config()
            .resolve(|name| self.loaded_settings("listener", name)?.listener(name))?;
        let mut consumer = registration
            .consumer_config()
            .resolve(|name| self.loaded_settings("consumer", name)?.consumer(name))?;
        if let Some(settings) = &self.settings {
            consumer = settings.apply_connection(consumer);
        }

        listener
            .validate()
            .map_err(|e| ContractError::config_validation("listener_config", e.to_string()))?;
        consumer
            .validate()
            .map_err(|e| ContractError::config_validation("consumer_config", e.to_string()))?;
        Ok((listener, consumer))
    }

    fn loaded_settings(&self, kind: &str, name: &str) -> Result<&KafkaSettings, ContractError> {
        self.settings.as_ref().ok_or_else(|| {
            ContractError::configuration(format!(
                "{kind} config '{name}' requested but no settings are loaded"
            ))
        })
    }
}
