//! Application-facing capabilities: deserializers, handlers, error handlers

use crate::{
    ConsumerRecord, Decision, DeserializeError, DispatchContext, HandlerError, RawRecord,
    RecordFailure,
};

/// Turns record bytes into a typed key or value
pub trait Deserializer<T>: Send + Sync {
    /// Deserialize `data` (absent for null keys / tombstones) read from `topic`
    fn deserialize(&self, topic: &str, data: Option<&[u8]>) -> Result<T, DeserializeError>;
}

/// Business logic invoked once per successfully deserialized record
///
/// Blocks its worker until it returns. Implementations must be safe for
/// concurrent calls when a registration runs more than one worker.
pub trait MessageHandler<K, V>: Send + Sync {
    fn handle(
        &self,
        record: &ConsumerRecord<K, V>,
        context: &DispatchContext,
    ) -> Result<(), HandlerError>;
}

impl<K, V, F> MessageHandler<K, V> for F
where
    F: Fn(&ConsumerRecord<K, V>, &DispatchContext) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(
        &self,
        record: &ConsumerRecord<K, V>,
        context: &DispatchContext,
    ) -> Result<(), HandlerError> {
        self(record, context)
    }
}

/// Policy consulted when deserialization or the handler fails
///
/// Receives the raw record because a deserialization failure leaves no typed
/// record to hand over.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, record: &RawRecord, failure: &RecordFailure) -> Decision;
}

impl<F> ErrorHandler for F
where
    F: Fn(&RawRecord, &RecordFailure) -> Decision + Send + Sync,
{
    fn handle(&self, record: &RawRecord, failure: &RecordFailure) -> Decision {
        self(record, failure)
    }
}
