//! Transaction management
//!
//! A transaction buffers operations in memory and applies them atomically
//! through a six-phase commit protocol:
//!
//! 1. encode each buffered operation as a journal entry and append it
//! 2. flush the journal to durable storage
//! 3. write data blocks for inserts and updates
//! 4. apply deletes (return block ids to the free list)
//! 5. update the superblock's block count and journal-tail pointer
//! 6. flush the superblock
//!
//! Journal-before-data ordering leaves a durable record of intent if a
//! crash lands between phases 2 and 6; superblock-last ordering means the
//! store's root never advances past data that is not yet durable. The
//! reconciliation pass at [`crate::db::Database::open`] replays that
//! journal-ahead condition.

mod transaction;

pub use transaction::{ApplyResult, PendingOp, Transaction, TxnMode, TxnState};

use thiserror::Error;

use crate::block::BlockId;
use crate::journal::JournalError;
use crate::store::StoreError;

/// Transaction operation errors
#[derive(Error, Debug)]
pub enum TxnError {
    /// Operation on an aborted (or otherwise non-active) transaction
    #[error("Transaction is not active (state: {0:?})")]
    NotActive(TxnState),

    /// Commit attempted on an already-committed transaction
    #[error("Transaction is already committed")]
    AlreadyCommitted,

    /// Write operation under a read-only transaction
    #[error("Cannot write: transaction is read-only")]
    ReadOnly,

    /// Malformed operation payload
    #[error("Invalid operation: {0}")]
    InvalidOp(String),

    /// The target block may not be mutated through a transaction
    #[error("Block {id} is immutable ({kind})")]
    ImmutableBlock { id: BlockId, kind: &'static str },

    /// Store failure during apply or commit
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Journal failure during commit
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    /// Attached proof failed verification or could not be dispatched
    #[error("Proof error: {0}")]
    Proof(#[from] crate::proof::ProofError),

    /// Attached proof was dispatched and rejected by its verifier
    #[error("Proof of type {0:?} was rejected")]
    ProofRejected(String),
}

/// Result type for transaction operations
pub type TxnResult<T> = Result<T, TxnError>;
