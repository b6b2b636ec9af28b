//! Proof registry error types

use thiserror::Error;

/// Proof registration and verification errors
#[derive(Error, Debug)]
pub enum ProofError {
    /// Unregister of a name with no current registration
    #[error("No verifier registered for {0:?}")]
    NotRegistered(String),

    /// Verification requested for a type with no registered verifier
    #[error("No verifier available for proof type {0:?}")]
    UnknownType(String),

    /// The proof blob is structurally invalid
    #[error("Invalid proof: {0}")]
    InvalidProof(String),
}

/// Result type for proof operations
pub type ProofResult<T> = Result<T, ProofError>;
