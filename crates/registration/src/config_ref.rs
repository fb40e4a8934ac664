//! Inline or named configuration

use contracts::ContractError;

/// A configuration given either directly or by name
///
/// Named entries are looked up in the external configuration when the
/// registration is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigRef<T> {
    Inline(T),
    Named(String),
}

impl<T: Clone> ConfigRef<T> {
    /// Resolve to a concrete configuration, looking up names with `lookup`
    pub fn resolve<F>(&self, lookup: F) -> Result<T, ContractError>
    where
        F: FnOnce(&str) -> Result<T, ContractError>,
    {
        match self {
            Self::Inline(config) => Ok(config.clone()),
            Self::Named(name) => lookup(name),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Inline(_) => None,
            Self::Named(name) => Some(name),
        }
    }

    pub fn inline(&self) -> Option<&T> {
        match self {
            Self::Inline(config) => Some(config),
            Self::Named(_) => None,
        }
    }
}
