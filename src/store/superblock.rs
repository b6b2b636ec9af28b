//! Superblock payload format
//!
//! The superblock lives at block id 0 and is the single mutable root of
//! the store. Payload layout (big-endian):
//! ```text
//! | Version | Block Count | Journal Head | Journal Tail | Next Seq |
//! | 2 bytes |   8 bytes   |   8 bytes    |   8 bytes    | 8 bytes  |
//! ```
//!
//! Every commit's last durable act is rewriting this payload; after a
//! clean commit the journal-tail field equals the most recently committed
//! journal block id, and next-seq the sequence number the next journal
//! entry will carry. Sequence numbers are independent of block ids:
//! journal blocks can land on reused low slots, sequence numbers only
//! ever grow.

use crate::block::{BlockId, FORMAT_VERSION};
use crate::store::error::{StoreError, StoreResult};

/// Encoded superblock payload size
pub const SUPERBLOCK_PAYLOAD_SIZE: usize = 34;

/// Global store metadata held in block 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// On-disk format version
    pub version: u16,
    /// Total blocks in the store, superblock included
    pub block_count: u64,
    /// Oldest journal block id (0 = empty journal)
    pub journal_head: BlockId,
    /// Most recently committed journal block id (0 = empty journal)
    pub journal_tail: BlockId,
    /// Sequence number the next journal entry will be assigned
    pub next_seq: u64,
}

impl Superblock {
    /// Superblock for a freshly created store: one block (itself), no journal
    pub fn fresh() -> Self {
        Self {
            version: FORMAT_VERSION,
            block_count: 1,
            journal_head: 0,
            journal_tail: 0,
            next_seq: 1,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SUPERBLOCK_PAYLOAD_SIZE);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.block_count.to_be_bytes());
        buf.extend_from_slice(&self.journal_head.to_be_bytes());
        buf.extend_from_slice(&self.journal_tail.to_be_bytes());
        buf.extend_from_slice(&self.next_seq.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> StoreResult<Self> {
        if buf.len() < SUPERBLOCK_PAYLOAD_SIZE {
            return Err(StoreError::InvalidSuperblock(format!(
                "payload too short: {} bytes",
                buf.len()
            )));
        }

        let version = u16::from_be_bytes([buf[0], buf[1]]);
        if version != FORMAT_VERSION {
            return Err(StoreError::InvalidSuperblock(format!(
                "unsupported version {version}"
            )));
        }

        let block_count = u64::from_be_bytes(buf[2..10].try_into().expect("sized slice"));
        let journal_head = u64::from_be_bytes(buf[10..18].try_into().expect("sized slice"));
        let journal_tail = u64::from_be_bytes(buf[18..26].try_into().expect("sized slice"));
        let next_seq = u64::from_be_bytes(buf[26..34].try_into().expect("sized slice"));

        if block_count == 0 {
            return Err(StoreError::InvalidSuperblock(
                "block count is zero".to_string(),
            ));
        }
        if next_seq == 0 {
            return Err(StoreError::InvalidSuperblock(
                "next sequence number is zero".to_string(),
            ));
        }

        Ok(Self {
            version,
            block_count,
            journal_head,
            journal_tail,
            next_seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superblock_round_trip() {
        let sb = Superblock {
            version: FORMAT_VERSION,
            block_count: 42,
            journal_head: 3,
            journal_tail: 17,
            next_seq: 29,
        };
        let decoded = Superblock::decode(&sb.encode()).unwrap();
        assert_eq!(decoded, sb);
    }

    #[test]
    fn test_fresh_superblock() {
        let sb = Superblock::fresh();
        assert_eq!(sb.block_count, 1);
        assert_eq!(sb.journal_head, 0);
        assert_eq!(sb.journal_tail, 0);
        assert_eq!(sb.next_seq, 1);
    }

    #[test]
    fn test_zero_block_count_rejected() {
        let mut buf = Superblock::fresh().encode();
        buf[2..10].copy_from_slice(&0u64.to_be_bytes());
        assert!(matches!(
            Superblock::decode(&buf),
            Err(StoreError::InvalidSuperblock(_))
        ));
    }

    #[test]
    fn test_zero_next_seq_rejected() {
        let mut buf = Superblock::fresh().encode();
        buf[26..34].copy_from_slice(&0u64.to_be_bytes());
        assert!(matches!(
            Superblock::decode(&buf),
            Err(StoreError::InvalidSuperblock(_))
        ));
    }
}
