//! Layered error definitions
//!
//! Categorized by source: config / builder / topic / broker. Per-record
//! failures (`HandlerError`, `DeserializeError`) are separate types because
//! they never leave a worker; they are turned into a `RecordFailure` and
//! routed to the registration's error handler.

use thiserror::Error;

use crate::TopicMismatch;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Registration misuse: missing topics, missing deserializers, unknown
    /// named configuration
    #[error("configuration error: {message}")]
    Configuration { message: String },

    // ===== Topic Errors =====
    /// Live topic metadata differs from the declared expectations
    #[error("topic configuration mismatch: {}", describe_mismatches(.mismatches))]
    TopicMismatch { mismatches: Vec<TopicMismatch> },

    // ===== Broker Errors =====
    /// Poll / commit / metadata request failed
    #[error("broker error during {operation}: {message}")]
    BrokerConnectivity { operation: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create registration configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create broker connectivity error
    pub fn broker(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BrokerConnectivity {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts a worker (as opposed to configuration errors
    /// that are reported before any worker exists)
    pub fn is_broker_error(&self) -> bool {
        matches!(self, Self::BrokerConnectivity { .. })
    }
}

fn describe_mismatches(mismatches: &[TopicMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure raised by application handler logic
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Create a handler error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it as the source
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure raised by a key or value deserializer
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DeserializeError {
    message: String,
}

impl DeserializeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
