//! Journal error types

use thiserror::Error;

use crate::block::BlockId;
use crate::store::StoreError;

/// Journal operation errors
#[derive(Error, Debug)]
pub enum JournalError {
    /// Underlying store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Entry payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A predecessor link does not resolve to a valid journal block
    #[error("Broken journal chain at block {at}: {reason}")]
    BrokenChain { at: BlockId, reason: String },

    /// The referenced block is not of journal type
    #[error("Block {id} is not a journal block")]
    NotJournal { id: BlockId },
}

/// Result type for journal operations
pub type JournalResult<T> = Result<T, JournalError>;
