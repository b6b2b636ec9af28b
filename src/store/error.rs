//! Store error types

use thiserror::Error;

use crate::block::{BlockError, BlockId};

/// Block store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Standard IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Block codec failure; CRC mismatches surface through here
    #[error("Block codec error: {0}")]
    Block(#[from] BlockError),

    /// Block id is unallocated, freed, or never made durable
    #[error("Block {id} not found")]
    NotFound { id: BlockId },

    /// The superblock failed to load
    #[error("Invalid superblock: {0}")]
    InvalidSuperblock(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Whether this error indicates the store itself may be compromised,
    /// as opposed to a caller or resource error.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Block(
                BlockError::BadMagic { .. }
                    | BlockError::CrcMismatch { .. }
                    | BlockError::UnsupportedVersion(_)
                    | BlockError::UnknownType(_)
                    | BlockError::InvalidLength(_)
            ) | StoreError::InvalidSuperblock(_)
        )
    }
}
