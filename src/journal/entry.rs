//! Journal entry payload format
//!
//! Each journal block's payload is one JSON-encoded [`JournalEntry`]
//! describing a committed operation: the operation kind, the affected
//! block, provenance, and the operation's full payload (base64). Carrying
//! the payload makes the journal sufficient for crash replay, not just
//! for audit rendering.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::block::{BlockId, BlockType};

/// Operation kind recorded in a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

/// One committed operation, as persisted in a journal block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonically increasing sequence number, assigned at append.
    /// Independent of the carrying block's id, which may be a reused slot.
    pub seq: u64,
    pub op: OpKind,
    /// Collection name, when the operation named one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Affected data block
    pub block_id: BlockId,
    /// Type tag name of the affected block (`document`, `schema`, ...)
    pub block_type: String,
    /// Operation payload, base64-encoded; absent for deletes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Caller-supplied provenance, echoed verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<serde_json::Value>,
}

impl JournalEntry {
    pub fn insert(
        block_id: BlockId,
        block_type: BlockType,
        payload: &[u8],
        collection: Option<String>,
        provenance: Option<serde_json::Value>,
    ) -> Self {
        Self {
            seq: 0,
            op: OpKind::Insert,
            collection,
            block_id,
            block_type: block_type.name().to_string(),
            payload: Some(BASE64.encode(payload)),
            provenance,
        }
    }

    pub fn update(block_id: BlockId, block_type: BlockType, payload: &[u8]) -> Self {
        Self {
            seq: 0,
            op: OpKind::Update,
            collection: None,
            block_id,
            block_type: block_type.name().to_string(),
            payload: Some(BASE64.encode(payload)),
            provenance: None,
        }
    }

    pub fn delete(block_id: BlockId, block_type: BlockType) -> Self {
        Self {
            seq: 0,
            op: OpKind::Delete,
            collection: None,
            block_id,
            block_type: block_type.name().to_string(),
            payload: None,
            provenance: None,
        }
    }

    /// Decode the base64 payload, if present
    pub fn payload_bytes(&self) -> Option<Vec<u8>> {
        self.payload.as_ref().and_then(|p| BASE64.decode(p).ok())
    }
}
