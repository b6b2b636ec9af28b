//! Block codec error types

use thiserror::Error;

/// Block encode/decode errors
#[derive(Error, Debug)]
pub enum BlockError {
    /// Payload exceeds the fixed block payload capacity
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Buffer is smaller than one block
    #[error("Truncated block: {len} bytes (need {need})")]
    Truncated { len: usize, need: usize },

    /// Magic number mismatch
    #[error("Bad magic number: {found:#010x}")]
    BadMagic { found: u32 },

    /// On-disk format version is not supported
    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u16),

    /// Unknown block type tag
    #[error("Unknown block type tag {0:#06x}")]
    UnknownType(u16),

    /// Payload length field exceeds capacity
    #[error("Invalid payload length {0}")]
    InvalidLength(u32),

    /// CRC checksum mismatch
    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },
}

/// Result type for block codec operations
pub type BlockResult<T> = Result<T, BlockError>;
