//! FormDB - a block storage and transaction engine
//!
//! Features:
//! - Fixed 4096-byte blocks with CRC32-checked headers
//! - Append-only journal chain with six-phase durable commits
//! - Open-time replay of journal entries from unfinished commits
//! - Pluggable proof verifier registry for evidence-carrying operations
//! - Stable C ABI for embedding from other languages

pub mod block;
pub mod db;
pub mod error;
pub mod ffi;
pub mod introspect;
pub mod journal;
pub mod proof;
pub mod store;
pub mod txn;

pub use block::{Block, BlockId, BlockType, BLOCK_SIZE, HEADER_SIZE, PAYLOAD_SIZE};
pub use db::{Database, DbConfig};
pub use error::{DbError, DbResult, Status};
pub use txn::{Transaction, TxnMode, TxnState};

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Packed engine version: `major * 10000 + minor * 100 + patch`.
pub const fn version() -> u32 {
    VERSION_MAJOR * 10_000 + VERSION_MINOR * 100 + VERSION_PATCH
}
