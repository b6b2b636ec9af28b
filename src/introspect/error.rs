//! Introspection error types

use thiserror::Error;

use crate::store::StoreError;

/// Introspection and rendering errors
#[derive(Error, Debug)]
pub enum IntrospectError {
    /// Underlying store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Output could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No schema blocks exist yet; a legitimate state for an empty store,
    /// reported rather than treated as success with fabricated output
    #[error("No schema blocks in store")]
    NoSchema,
}

/// Result type for introspection operations
pub type IntrospectResult<T> = Result<T, IntrospectError>;
