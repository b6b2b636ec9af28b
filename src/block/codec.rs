//! On-disk block format
//!
//! Block layout (4096 bytes, all integers big-endian):
//! ```text
//! +--------+---------+--------+--------+---------+--------+----------+
//! | Magic  | Version |  Type  | CRC32  | PayLen  |  Prev  | Reserved |
//! | 4 bytes| 2 bytes |2 bytes |4 bytes | 4 bytes |8 bytes | 40 bytes |
//! +--------+---------+--------+--------+---------+--------+----------+
//! |                    Payload (4032 bytes)                          |
//! +-------------------------------------------------------------------+
//! ```
//!
//! - Magic: `"FMDB"`
//! - CRC32: checksum of `payload[..pay_len]` only (header excluded)
//! - Prev: predecessor block id for chained blocks (0 = none)
//! - Reserved bytes and payload padding are always zero, so encoding
//!   is deterministic: encode -> decode -> encode is byte-identical.
//!
//! This layout is a frozen wire-compatibility contract. Other processes
//! (including non-Rust bindings reading the same file) depend on exactly
//! these offsets and on big-endian field order.

use crate::block::error::{BlockError, BlockResult};

/// Total block size in bytes (4 KiB)
pub const BLOCK_SIZE: usize = 4096;

/// Block header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Maximum payload size per block
pub const PAYLOAD_SIZE: usize = BLOCK_SIZE - HEADER_SIZE;

/// Magic number at the start of every block
pub const MAGIC: [u8; 4] = *b"FMDB";

/// Current on-disk format version
pub const FORMAT_VERSION: u16 = 1;

/// Block type tags
///
/// Tag values are part of the wire format. `0x0011` (document) is frozen
/// by the foreign boundary contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BlockType {
    /// Unallocated / freed slot, reusable by the allocator
    Free = 0x0000,
    /// The store's root block (block id 0)
    Superblock = 0x0001,
    /// Append-only journal entry
    Journal = 0x0002,
    /// Collection schema record
    Schema = 0x0003,
    /// Document record
    Document = 0x0011,
    /// Edge (document relationship) record
    Edge = 0x0012,
}

impl TryFrom<u16> for BlockType {
    type Error = BlockError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(Self::Free),
            0x0001 => Ok(Self::Superblock),
            0x0002 => Ok(Self::Journal),
            0x0003 => Ok(Self::Schema),
            0x0011 => Ok(Self::Document),
            0x0012 => Ok(Self::Edge),
            other => Err(BlockError::UnknownType(other)),
        }
    }
}

impl BlockType {
    /// Parse a short lowercase name back into a type tag
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "free" => Some(Self::Free),
            "superblock" => Some(Self::Superblock),
            "journal" => Some(Self::Journal),
            "schema" => Some(Self::Schema),
            "document" => Some(Self::Document),
            "edge" => Some(Self::Edge),
            _ => None,
        }
    }

    /// Short lowercase name used in rendered output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Superblock => "superblock",
            Self::Journal => "journal",
            Self::Schema => "schema",
            Self::Document => "document",
            Self::Edge => "edge",
        }
    }
}

/// Decoded block header fields
#[derive(Debug, Clone, Copy)]
pub struct BlockHeader {
    pub block_type: BlockType,
    pub checksum: u32,
    pub payload_len: u32,
    pub prev: u64,
}

impl BlockHeader {
    /// Decode header fields without verifying the payload checksum.
    ///
    /// Used by the allocator's open-time scan, which only needs type tags
    /// to rebuild the free list. Full verification happens in
    /// [`Block::decode`].
    pub fn decode(buf: &[u8]) -> BlockResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(BlockError::Truncated {
                len: buf.len(),
                need: HEADER_SIZE,
            });
        }

        if buf[0..4] != MAGIC {
            let found = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
            return Err(BlockError::BadMagic { found });
        }

        let version = u16::from_be_bytes([buf[4], buf[5]]);
        if version != FORMAT_VERSION {
            return Err(BlockError::UnsupportedVersion(version));
        }

        let block_type = BlockType::try_from(u16::from_be_bytes([buf[6], buf[7]]))?;
        let checksum = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let payload_len = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        if payload_len as usize > PAYLOAD_SIZE {
            return Err(BlockError::InvalidLength(payload_len));
        }
        let prev = u64::from_be_bytes([
            buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
        ]);

        Ok(Self {
            block_type,
            checksum,
            payload_len,
            prev,
        })
    }
}

/// A decoded block: type tag, predecessor link, and live payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub block_type: BlockType,
    pub prev: u64,
    pub payload: Vec<u8>,
}

impl Block {
    /// Create a block with no predecessor link
    pub fn new(block_type: BlockType, payload: Vec<u8>) -> BlockResult<Self> {
        Self::chained(block_type, 0, payload)
    }

    /// Create a block linked to a predecessor
    pub fn chained(block_type: BlockType, prev: u64, payload: Vec<u8>) -> BlockResult<Self> {
        if payload.len() > PAYLOAD_SIZE {
            return Err(BlockError::PayloadTooLarge {
                size: payload.len(),
                max: PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            block_type,
            prev,
            payload,
        })
    }

    /// A zeroed free-slot block, written when a block id is returned to
    /// the free list at delete-commit.
    pub fn free_slot() -> Self {
        Self {
            block_type: BlockType::Free,
            prev: 0,
            payload: Vec::new(),
        }
    }

    /// Encode to a full 4096-byte buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; BLOCK_SIZE];

        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_be_bytes());
        buf[6..8].copy_from_slice(&(self.block_type as u16).to_be_bytes());

        let crc = crc32fast::hash(&self.payload);
        buf[8..12].copy_from_slice(&crc.to_be_bytes());
        buf[12..16].copy_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf[16..24].copy_from_slice(&self.prev.to_be_bytes());
        // bytes 24..64 reserved, zero

        buf[HEADER_SIZE..HEADER_SIZE + self.payload.len()].copy_from_slice(&self.payload);

        buf
    }

    /// Decode and verify a full block buffer
    pub fn decode(buf: &[u8]) -> BlockResult<Self> {
        if buf.len() < BLOCK_SIZE {
            return Err(BlockError::Truncated {
                len: buf.len(),
                need: BLOCK_SIZE,
            });
        }

        let header = BlockHeader::decode(buf)?;
        let payload = buf[HEADER_SIZE..HEADER_SIZE + header.payload_len as usize].to_vec();

        let computed = crc32fast::hash(&payload);
        if computed != header.checksum {
            return Err(BlockError::CrcMismatch {
                expected: header.checksum,
                actual: computed,
            });
        }

        Ok(Self {
            block_type: header.block_type,
            prev: header.prev,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_encode_decode() {
        let block = Block::new(BlockType::Document, b"{\"name\":\"Alice\"}".to_vec()).unwrap();
        let encoded = block.encode();
        assert_eq!(encoded.len(), BLOCK_SIZE);

        let decoded = Block::decode(&encoded).unwrap();
        assert_eq!(decoded.block_type, BlockType::Document);
        assert_eq!(decoded.prev, 0);
        assert_eq!(decoded.payload, b"{\"name\":\"Alice\"}");
    }

    #[test]
    fn test_chained_block_keeps_prev() {
        let block = Block::chained(BlockType::Journal, 7, b"entry".to_vec()).unwrap();
        let decoded = Block::decode(&block.encode()).unwrap();
        assert_eq!(decoded.prev, 7);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let block = Block::new(BlockType::Document, b"stable".to_vec()).unwrap();
        let first = block.encode();
        let second = Block::decode(&first).unwrap().encode();
        assert_eq!(first, second);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; PAYLOAD_SIZE + 1];
        let result = Block::new(BlockType::Document, payload);
        assert!(matches!(result, Err(BlockError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_payload_at_capacity() {
        let payload = vec![0xAB; PAYLOAD_SIZE];
        let block = Block::new(BlockType::Document, payload.clone()).unwrap();
        let decoded = Block::decode(&block.encode()).unwrap();
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn test_bad_magic() {
        let block = Block::new(BlockType::Document, b"x".to_vec()).unwrap();
        let mut encoded = block.encode();
        encoded[0] = b'X';
        assert!(matches!(
            Block::decode(&encoded),
            Err(BlockError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_crc_mismatch_on_corrupt_payload() {
        let block = Block::new(BlockType::Document, b"important".to_vec()).unwrap();
        let mut encoded = block.encode();
        encoded[HEADER_SIZE] ^= 0xFF;
        assert!(matches!(
            Block::decode(&encoded),
            Err(BlockError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_type_tag() {
        let block = Block::new(BlockType::Document, b"x".to_vec()).unwrap();
        let mut encoded = block.encode();
        encoded[6..8].copy_from_slice(&0x7777u16.to_be_bytes());
        assert!(matches!(
            Block::decode(&encoded),
            Err(BlockError::UnknownType(0x7777))
        ));
    }

    #[test]
    fn test_header_scan_skips_checksum() {
        let block = Block::new(BlockType::Schema, b"schema".to_vec()).unwrap();
        let mut encoded = block.encode();
        encoded[HEADER_SIZE] ^= 0xFF; // payload corrupt, header intact

        let header = BlockHeader::decode(&encoded).unwrap();
        assert_eq!(header.block_type, BlockType::Schema);
        assert!(Block::decode(&encoded).is_err());
    }
}
