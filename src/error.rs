//! Top-level error type and stable status-code mapping
//!
//! Errors fall into three tiers: caller errors (invalid arguments,
//! inactive transactions, read-only writes), resource errors (missing
//! blocks, unregistered verifiers), and integrity errors (checksum
//! mismatches, broken journal chains). Integrity errors get their own
//! status so callers can distinguish "you asked wrong" from "the store
//! may be compromised". Nothing here retries; retries are caller policy.

use thiserror::Error;

use crate::block::BlockError;
use crate::introspect::IntrospectError;
use crate::journal::JournalError;
use crate::proof::ProofError;
use crate::store::StoreError;
use crate::txn::TxnError;

/// Stable status codes shared with the foreign boundary.
///
/// The numbering is additive-only: values 0-7 are the original contract,
/// 8-11 the declared extension codes. Never renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Internal = 1,
    NotFound = 2,
    InvalidArgument = 3,
    OutOfMemory = 4,
    NotImplemented = 5,
    TxnNotActive = 6,
    TxnAlreadyCommitted = 7,
    IoError = 8,
    Corruption = 9,
    Conflict = 10,
    AlreadyExists = 11,
}

/// Unified error for the public database surface
#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Txn(#[from] TxnError),

    #[error(transparent)]
    Introspect(#[from] IntrospectError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for the public database surface
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Map to the stable foreign-boundary status code.
    pub fn status(&self) -> Status {
        match self {
            DbError::Block(e) => block_status(e),
            DbError::Store(e) => store_status(e),
            DbError::Journal(e) => journal_status(e),
            DbError::Txn(e) => txn_status(e),
            DbError::Introspect(e) => match e {
                IntrospectError::Store(s) => store_status(s),
                IntrospectError::Serialization(_) => Status::Internal,
                IntrospectError::NoSchema => Status::NotFound,
            },
            DbError::Proof(e) => match e {
                ProofError::NotRegistered(_) => Status::NotFound,
                ProofError::UnknownType(_) => Status::NotImplemented,
                ProofError::InvalidProof(_) => Status::InvalidArgument,
            },
            DbError::InvalidArgument(_) => Status::InvalidArgument,
        }
    }
}

fn block_status(e: &BlockError) -> Status {
    match e {
        BlockError::PayloadTooLarge { .. } => Status::InvalidArgument,
        // Everything else means the bytes on disk are not what the codec
        // wrote: integrity, not argument, errors.
        BlockError::Truncated { .. }
        | BlockError::BadMagic { .. }
        | BlockError::UnsupportedVersion(_)
        | BlockError::UnknownType(_)
        | BlockError::InvalidLength(_)
        | BlockError::CrcMismatch { .. } => Status::Corruption,
    }
}

fn store_status(e: &StoreError) -> Status {
    match e {
        StoreError::Io(_) => Status::IoError,
        StoreError::Block(b) => block_status(b),
        StoreError::NotFound { .. } => Status::NotFound,
        StoreError::InvalidSuperblock(_) => Status::Corruption,
    }
}

fn journal_status(e: &JournalError) -> Status {
    match e {
        JournalError::Store(s) => store_status(s),
        JournalError::Serialization(_) => Status::Internal,
        JournalError::BrokenChain { .. } | JournalError::NotJournal { .. } => Status::Corruption,
    }
}

fn txn_status(e: &TxnError) -> Status {
    match e {
        TxnError::NotActive(_) => Status::TxnNotActive,
        TxnError::AlreadyCommitted => Status::TxnAlreadyCommitted,
        TxnError::ReadOnly | TxnError::InvalidOp(_) | TxnError::ImmutableBlock { .. } => {
            Status::InvalidArgument
        }
        TxnError::Store(s) => store_status(s),
        TxnError::Journal(j) => journal_status(j),
        TxnError::Proof(p) => match p {
            ProofError::NotRegistered(_) => Status::NotFound,
            ProofError::UnknownType(_) => Status::NotImplemented,
            ProofError::InvalidProof(_) => Status::InvalidArgument,
        },
        TxnError::ProofRejected(_) => Status::InvalidArgument,
    }
}
