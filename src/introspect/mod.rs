//! Introspection and query surface
//!
//! Full-type scans and canonical text rendering over an open store.
//! Everything here is read-only and transaction-free: buffered writes are
//! invisible until commit, so scans interleave safely with an in-flight
//! transaction's buffering phase.

pub mod error;

pub use error::{IntrospectError, IntrospectResult};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;

use crate::block::{BlockId, BlockType};
use crate::store::BlockStore;

/// Text format selector for rendered output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderFormat {
    /// One JSON document per rendered item
    #[default]
    Json,
}

/// Options recognized by the render surfaces
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOpts {
    pub format: RenderFormat,
    /// Include block-level metadata (type, size, predecessor link)
    pub include_metadata: bool,
}

/// One live block returned by a full-type scan
#[derive(Debug, Clone, Serialize)]
pub struct BlockInfo {
    pub block_id: BlockId,
    /// Live payload length in bytes
    pub size: u32,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

/// Scan the whole store and return every live block of `block_type`.
pub fn read_blocks_by_type(
    store: &BlockStore,
    block_type: BlockType,
) -> IntrospectResult<Vec<BlockInfo>> {
    let mut blocks = Vec::new();

    for id in 1..store.block_count() {
        let header = match store.read_header(id) {
            Ok(h) => h,
            Err(crate::store::StoreError::NotFound { .. }) => continue,
            Err(e) => return Err(e.into()),
        };
        if header.block_type != block_type || header.block_type == BlockType::Free {
            continue;
        }

        // Full read verifies the checksum; corruption is surfaced, not
        // skipped.
        let block = store.read(id)?;
        blocks.push(BlockInfo {
            block_id: id,
            size: block.payload.len() as u32,
            payload: block.payload,
        });
    }

    Ok(blocks)
}

/// Render a scan result as a JSON array of `{block_id, size, data}`.
pub fn blocks_to_json(blocks: &[BlockInfo]) -> IntrospectResult<String> {
    let items: Vec<serde_json::Value> = blocks
        .iter()
        .map(|b| {
            serde_json::json!({
                "block_id": b.block_id,
                "size": b.size,
                "data": payload_value(&b.payload),
            })
        })
        .collect();
    Ok(serde_json::to_string(&items)?)
}

/// Render one block as canonical JSON text.
pub fn render_block(
    store: &BlockStore,
    id: BlockId,
    opts: &RenderOpts,
) -> IntrospectResult<String> {
    let block = store.read(id)?;

    let value = if opts.include_metadata {
        serde_json::json!({
            "block_id": id,
            "type": block.block_type.name(),
            "size": block.payload.len(),
            "prev": block.prev,
            "data": payload_value(&block.payload),
        })
    } else {
        serde_json::json!({
            "block_id": id,
            "data": payload_value(&block.payload),
        })
    };

    Ok(serde_json::to_string(&value)?)
}

/// Structural metadata derived from scanning schema blocks.
///
/// Fails with [`IntrospectError::NoSchema`] when the store holds no schema
/// blocks yet; callers report that state rather than crash on it.
pub fn introspect_schema(store: &BlockStore) -> IntrospectResult<String> {
    let schemas = schema_payloads(store)?;
    let value = serde_json::json!({ "collections": schemas });
    Ok(serde_json::to_string(&value)?)
}

/// Constraint metadata extracted from schema blocks' `constraints` fields.
pub fn introspect_constraints(store: &BlockStore) -> IntrospectResult<String> {
    let schemas = schema_payloads(store)?;

    let mut constraints = Vec::new();
    for schema in &schemas {
        if let Some(list) = schema.get("constraints").and_then(|c| c.as_array()) {
            constraints.extend(list.iter().cloned());
        }
    }

    let value = serde_json::json!({ "constraints": constraints });
    Ok(serde_json::to_string(&value)?)
}

fn schema_payloads(store: &BlockStore) -> IntrospectResult<Vec<serde_json::Value>> {
    let blocks = read_blocks_by_type(store, BlockType::Schema)?;
    if blocks.is_empty() {
        return Err(IntrospectError::NoSchema);
    }
    Ok(blocks.iter().map(|b| payload_value(&b.payload)).collect())
}

/// Payload as a JSON value: parsed when the bytes are valid JSON,
/// otherwise base64 so binary payloads still render deterministically.
fn payload_value(payload: &[u8]) -> serde_json::Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| serde_json::Value::String(BASE64.encode(payload)))
}
