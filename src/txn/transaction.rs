//! Transaction handle, buffered operation log, and the commit protocol

use std::sync::Arc;

use crate::block::{Block, BlockError, BlockId, BlockType, PAYLOAD_SIZE};
use crate::db::{DbInner, Engine};
use crate::journal::JournalEntry;
use crate::store::StoreError;
use crate::txn::{TxnError, TxnResult};

/// Transaction mode, fixed at begin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    ReadOnly,
    ReadWrite,
}

/// Transaction state machine: `Active` is the only non-terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

/// A buffered operation awaiting commit
#[derive(Debug, Clone)]
pub enum PendingOp {
    Insert {
        /// Tentative block id reserved at apply time
        id: BlockId,
        block_type: BlockType,
        payload: Vec<u8>,
        collection: Option<String>,
        provenance: Option<serde_json::Value>,
    },
    Update {
        id: BlockId,
        block_type: BlockType,
        payload: Vec<u8>,
    },
    Delete {
        id: BlockId,
        block_type: BlockType,
    },
}

impl PendingOp {
    fn to_entry(&self) -> JournalEntry {
        match self {
            PendingOp::Insert {
                id,
                block_type,
                payload,
                collection,
                provenance,
            } => JournalEntry::insert(
                *id,
                *block_type,
                payload,
                collection.clone(),
                provenance.clone(),
            ),
            PendingOp::Update {
                id,
                block_type,
                payload,
            } => JournalEntry::update(*id, *block_type, payload),
            PendingOp::Delete { id, block_type } => JournalEntry::delete(*id, *block_type),
        }
    }
}

/// Result of a successful apply
#[derive(Debug, Clone)]
pub struct ApplyResult {
    /// Tentative block id for inserts; the target id for update/delete
    pub block_id: BlockId,
    /// Provenance record echoed back to the caller
    pub provenance: serde_json::Value,
}

/// An ephemeral, caller-owned transaction over one database handle.
///
/// Operations are buffered and invisible to readers until [`commit`]
/// completes; [`abort`] discards the buffer and leaves the store
/// byte-for-byte unchanged.
///
/// [`commit`]: Transaction::commit
/// [`abort`]: Transaction::abort
pub struct Transaction {
    db: Arc<DbInner>,
    mode: TxnMode,
    state: TxnState,
    ops: Vec<PendingOp>,
    /// Block ids reserved for inserts, released if the commit never lands
    tentative: Vec<BlockId>,
}

impl Transaction {
    pub(crate) fn new(db: Arc<DbInner>, mode: TxnMode) -> Self {
        Self {
            db,
            mode,
            state: TxnState::Active,
            ops: Vec::new(),
            tentative: Vec::new(),
        }
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    /// Number of buffered operations
    pub fn pending(&self) -> usize {
        self.ops.len()
    }

    /// Buffer an insert of a new block, returning its tentative id.
    pub fn insert(
        &mut self,
        block_type: BlockType,
        payload: Vec<u8>,
        collection: Option<String>,
        provenance: Option<serde_json::Value>,
    ) -> TxnResult<BlockId> {
        self.ensure_writable()?;
        check_payload_len(payload.len())?;
        if !matches!(
            block_type,
            BlockType::Document | BlockType::Schema | BlockType::Edge
        ) {
            return Err(TxnError::InvalidOp(format!(
                "cannot insert block of type {}",
                block_type.name()
            )));
        }

        let id = self.db.engine.lock().store.allocate();
        self.tentative.push(id);
        self.ops.push(PendingOp::Insert {
            id,
            block_type,
            payload,
            collection,
            provenance,
        });
        Ok(id)
    }

    /// Buffer an in-place payload replacement for an existing block.
    pub fn update(&mut self, id: BlockId, payload: Vec<u8>) -> TxnResult<()> {
        self.ensure_writable()?;
        check_payload_len(payload.len())?;
        let block_type = self.mutable_target_type(id)?;
        self.ops.push(PendingOp::Update {
            id,
            block_type,
            payload,
        });
        Ok(())
    }

    /// Buffer a delete; the block id returns to the free list at commit.
    pub fn delete(&mut self, id: BlockId) -> TxnResult<()> {
        self.ensure_writable()?;
        let block_type = self.mutable_target_type(id)?;
        self.ops.push(PendingOp::Delete { id, block_type });
        Ok(())
    }

    /// Apply a JSON-encoded operation.
    ///
    /// Accepts `{"op":"insert"|"update"|"delete", ...}` records; a bare
    /// JSON object is treated as a document insert (boundary convention).
    pub fn apply_json(&mut self, op_bytes: &[u8]) -> TxnResult<ApplyResult> {
        self.ensure_active()?;

        let value: serde_json::Value = serde_json::from_slice(op_bytes)
            .map_err(|e| TxnError::InvalidOp(format!("operation is not valid JSON: {e}")))?;
        let obj = value
            .as_object()
            .ok_or_else(|| TxnError::InvalidOp("operation must be a JSON object".to_string()))?;

        let op_kind = obj.get("op").and_then(|v| v.as_str()).unwrap_or("insert");
        let provenance = obj.get("provenance").cloned();

        // Operations may carry an attached proof record; when present it
        // must verify before the operation buffers.
        if let Some(proof) = obj.get("proof") {
            let raw = serde_json::to_vec(proof).map_err(|e| TxnError::InvalidOp(e.to_string()))?;
            if !self.db.registry.verify(&raw)? {
                let proof_type = proof
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("")
                    .to_string();
                return Err(TxnError::ProofRejected(proof_type));
            }
        }

        match op_kind {
            "insert" => {
                let collection = obj
                    .get("collection")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                let block_type = match obj.get("block_type").and_then(|v| v.as_str()) {
                    None => BlockType::Document,
                    Some(name) => BlockType::from_name(name).ok_or_else(|| {
                        TxnError::InvalidOp(format!("unknown block_type {name:?}"))
                    })?,
                };
                // `doc` holds the document when the op is wrapped;
                // otherwise the whole object is the document.
                let doc = obj.get("doc").cloned().unwrap_or(value.clone());
                let payload = serde_json::to_vec(&doc)
                    .map_err(|e| TxnError::InvalidOp(e.to_string()))?;

                let id = self.insert(block_type, payload, collection, provenance.clone())?;
                Ok(ApplyResult {
                    block_id: id,
                    provenance: serde_json::json!({
                        "block_id": id,
                        "op": "insert",
                        "provenance": provenance,
                    }),
                })
            }
            "update" => {
                let id = require_block_id(obj)?;
                let doc = obj.get("doc").ok_or_else(|| {
                    TxnError::InvalidOp("update requires a doc field".to_string())
                })?;
                let payload =
                    serde_json::to_vec(doc).map_err(|e| TxnError::InvalidOp(e.to_string()))?;
                self.update(id, payload)?;
                Ok(ApplyResult {
                    block_id: id,
                    provenance: serde_json::json!({
                        "block_id": id,
                        "op": "update",
                        "provenance": provenance,
                    }),
                })
            }
            "delete" => {
                let id = require_block_id(obj)?;
                self.delete(id)?;
                Ok(ApplyResult {
                    block_id: id,
                    provenance: serde_json::json!({
                        "block_id": id,
                        "op": "delete",
                        "provenance": provenance,
                    }),
                })
            }
            other => Err(TxnError::InvalidOp(format!("unknown op {other:?}"))),
        }
    }

    /// Run the six-phase commit protocol over the buffered operations.
    ///
    /// Any phase failure moves the transaction to `Aborted` and returns
    /// the failure; there is no partial-commit state. A failure after the
    /// journal flush leaves the journal ahead of the superblock, which
    /// the open-time reconciliation pass replays.
    pub fn commit(&mut self) -> TxnResult<()> {
        match self.state {
            TxnState::Active => {}
            TxnState::Committed => return Err(TxnError::AlreadyCommitted),
            TxnState::Aborted => return Err(TxnError::NotActive(TxnState::Aborted)),
        }

        if self.ops.is_empty() {
            self.state = TxnState::Committed;
            return Ok(());
        }

        let db = self.db.clone();
        let mut engine = db.engine.lock();
        match run_commit(&mut engine, &self.ops) {
            Ok(()) => {
                tracing::debug!(ops = self.ops.len(), "transaction committed");
                self.state = TxnState::Committed;
                self.tentative.clear();
                Ok(())
            }
            Err(e) => {
                self.state = TxnState::Aborted;
                self.tentative.clear();
                Err(e)
            }
        }
    }

    /// Discard the buffer; no durable bytes are touched.
    pub fn abort(&mut self) -> TxnResult<()> {
        if self.state != TxnState::Active {
            return Err(TxnError::NotActive(self.state));
        }

        let mut engine = self.db.engine.lock();
        for id in self.tentative.drain(..).rev() {
            engine.store.release(id);
        }
        self.ops.clear();
        self.state = TxnState::Aborted;
        Ok(())
    }

    fn ensure_active(&self) -> TxnResult<()> {
        if self.state != TxnState::Active {
            return Err(TxnError::NotActive(self.state));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> TxnResult<()> {
        self.ensure_active()?;
        if self.mode == TxnMode::ReadOnly {
            return Err(TxnError::ReadOnly);
        }
        Ok(())
    }

    /// Resolve the target of an update/delete, rejecting blocks that may
    /// not be mutated through a transaction.
    fn mutable_target_type(&self, id: BlockId) -> TxnResult<BlockType> {
        let engine = self.db.engine.lock();
        let header = engine.store.read_header(id)?;
        match header.block_type {
            BlockType::Superblock => Err(TxnError::ImmutableBlock {
                id,
                kind: "superblock",
            }),
            BlockType::Journal => Err(TxnError::ImmutableBlock { id, kind: "journal" }),
            BlockType::Free => Err(TxnError::Store(StoreError::NotFound { id })),
            t => Ok(t),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // A dropped active transaction behaves like an abort: reserved
        // ids go back to the allocator.
        if self.state == TxnState::Active && !self.tentative.is_empty() {
            let mut engine = self.db.engine.lock();
            for id in self.tentative.drain(..).rev() {
                engine.store.release(id);
            }
        }
    }
}

fn require_block_id(obj: &serde_json::Map<String, serde_json::Value>) -> TxnResult<BlockId> {
    obj.get("block_id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| TxnError::InvalidOp("operation requires a numeric block_id".to_string()))
}

fn check_payload_len(len: usize) -> TxnResult<()> {
    if len > PAYLOAD_SIZE {
        return Err(TxnError::Store(StoreError::Block(
            BlockError::PayloadTooLarge {
                size: len,
                max: PAYLOAD_SIZE,
            },
        )));
    }
    Ok(())
}

fn run_commit(engine: &mut Engine, ops: &[PendingOp]) -> TxnResult<()> {
    let committed = engine.journal;
    let mut staged: Vec<BlockId> = Vec::with_capacity(ops.len());

    // Phases 1-2: journal entries, then flush
    let journaled = (|| -> TxnResult<()> {
        for op in ops {
            let id = engine.journal.append(&mut engine.store, op.to_entry())?;
            staged.push(id);
        }
        engine.store.sync_data()?;
        Ok(())
    })();

    if let Err(e) = journaled {
        // Nothing is guaranteed durable yet: scrub the staged entries,
        // return tentative insert ids to the allocator, and restore the
        // committed chain pointers.
        for id in staged.iter().rev() {
            let _ = engine.store.free(*id);
        }
        for op in ops.iter().rev() {
            if let PendingOp::Insert { id, .. } = op {
                engine.store.release(*id);
            }
        }
        engine.journal = committed;
        return Err(e);
    }

    if let Err(e) = apply_phases(engine, ops) {
        // The journal is durable but the superblock never advanced: the
        // journal-ahead condition. Later commits chain from the committed
        // tail; the next open replays the orphaned entries.
        tracing::warn!(error = %e, "commit failed after journal flush; journal left ahead of superblock");
        engine.journal = committed;
        return Err(e);
    }

    Ok(())
}

fn apply_phases(engine: &mut Engine, ops: &[PendingOp]) -> TxnResult<()> {
    // Phase 3: data blocks for inserts and updates
    for op in ops {
        match op {
            PendingOp::Insert {
                id,
                block_type,
                payload,
                ..
            }
            | PendingOp::Update {
                id,
                block_type,
                payload,
            } => {
                let block = Block::new(*block_type, payload.clone()).map_err(StoreError::from)?;
                engine.store.write(*id, &block)?;
            }
            PendingOp::Delete { .. } => {}
        }
    }

    // Phase 4: deletes return ids to the free list
    for op in ops {
        if let PendingOp::Delete { id, .. } = op {
            engine.store.free(*id)?;
        }
    }

    // Phases 5-6: superblock last, then flush
    engine.store.write_superblock(
        engine.journal.head(),
        engine.journal.tail(),
        engine.journal.next_seq(),
    )?;
    engine.store.sync_data()?;

    Ok(())
}
