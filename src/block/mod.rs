//! Fixed-layout block codec
//!
//! Defines the on-disk record format shared by every subsystem: 4096-byte
//! blocks with a 64-byte checksummed header and a 4032-byte payload. Pure
//! and stateless; the allocator in [`crate::store`] decides where blocks
//! live.

pub mod codec;
pub mod error;

pub use codec::{
    Block, BlockHeader, BlockType, BLOCK_SIZE, FORMAT_VERSION, HEADER_SIZE, MAGIC, PAYLOAD_SIZE,
};
pub use error::{BlockError, BlockResult};

/// Logical block identifier (index into the backing store)
pub type BlockId = u64;
