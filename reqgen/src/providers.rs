//! Capabilities the engine calls out to: resolving ids of existing
//! resources and creating resources as a side effect of some invalidation
//! strategies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No valid id available for '{path}': {reason}")]
    IdUnavailable { path: String, reason: String },
    #[error("Creating a resource at '{path}' failed with status {status_code}: {body}")]
    CreateFailed {
        path: String,
        status_code: u16,
        body: Value,
    },
    #[error("{0}")]
    Other(String),
}

/// Supplies the id of an existing resource for a dependency or a path
/// parameter.
pub trait IdProvider {
    /// # Errors
    /// Returns `ProviderError` when no id can be produced for `path`.
    fn valid_id(&self, path: &str, operation_id: Option<&str>) -> Result<Value, ProviderError>;
}

/// Outcome of a create call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedResource {
    pub ok: bool,
    pub status_code: u16,
    pub body: Value,
}

/// Issues a side-effecting POST against the system under test.
pub trait ResourceCreator {
    /// # Errors
    /// Returns `ProviderError` when the request cannot be performed at all.
    fn create(
        &self,
        path: &str,
        body: &Value,
        query: &Map<String, Value>,
        headers: &Map<String, Value>,
    ) -> Result<CreatedResource, ProviderError>;
}

/// Default provider for builders that were given none.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableIdProvider;

impl IdProvider for UnavailableIdProvider {
    fn valid_id(&self, path: &str, _operation_id: Option<&str>) -> Result<Value, ProviderError> {
        Err(ProviderError::IdUnavailable {
            path: path.to_owned(),
            reason: "no id provider configured".to_owned(),
        })
    }
}

/// Default creator for builders that were given none.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCreator;

impl ResourceCreator for UnavailableCreator {
    fn create(
        &self,
        path: &str,
        _body: &Value,
        _query: &Map<String, Value>,
        _headers: &Map<String, Value>,
    ) -> Result<CreatedResource, ProviderError> {
        Err(ProviderError::Other(format!(
            "no resource creator configured for '{path}'"
        )))
    }
}

/// Provider that maps path prefixes to fixed ids, useful for tests and for
/// replaying recorded runs.
#[derive(Debug, Default, Clone)]
pub struct StaticIdProvider {
    ids: Vec<(String, Value)>,
}

impl StaticIdProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(mut self, path: &str, id: Value) -> Self {
        self.ids.push((path.to_owned(), id));
        self
    }
}

impl IdProvider for StaticIdProvider {
    fn valid_id(&self, path: &str, _operation_id: Option<&str>) -> Result<Value, ProviderError> {
        self.ids
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, id)| id.clone())
            .ok_or_else(|| ProviderError::IdUnavailable {
                path: path.to_owned(),
                reason: "path not registered".to_owned(),
            })
    }
}
