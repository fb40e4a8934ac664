//! Dispatcher error types

use thiserror::Error;

/// Dispatch engine errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A registration with the same name is already submitted
    #[error("registration '{name}' is already submitted")]
    DuplicateRegistration { name: String },

    /// Configuration, topic mismatch or broker error (from contract)
    #[error("{0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    /// Create a duplicate registration error
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateRegistration { name: name.into() }
    }

    /// The underlying contract error, if any
    pub fn contract(&self) -> Option<&contracts::ContractError> {
        match self {
            Self::Contract(e) => Some(e),
            Self::DuplicateRegistration { .. } => None,
        }
    }

    pub fn is_topic_mismatch(&self) -> bool {
        matches!(
            self.contract(),
            Some(contracts::ContractError::TopicMismatch { .. })
        )
    }
}
