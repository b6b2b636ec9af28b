//! Block allocation and the backing store file
//!
//! Maps logical block identifiers to file offsets, tracks a free list for
//! slot reuse, and owns the superblock at block 0. Durability is driven
//! from the transaction commit protocol, never from here.

pub mod error;
pub mod file;
pub mod superblock;

pub use error::{StoreError, StoreResult};
pub use file::{BlockStore, StoreConfig};
pub use superblock::{Superblock, SUPERBLOCK_PAYLOAD_SIZE};
