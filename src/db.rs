//! Database handle
//!
//! Ties the allocator, journal, transaction manager, and proof registry
//! together behind one handle. The concurrency model is single-writer,
//! cooperative-use: one process, at most one read-write transaction being
//! assembled at a time per handle; the internal lock keeps interleaved
//! reads safe against an in-flight commit within this process, but
//! cross-process discipline is the caller's responsibility.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::{Block, BlockId, BlockType};
use crate::error::{DbError, DbResult};
use crate::introspect::{self, BlockInfo, RenderOpts};
use crate::journal::{Journal, JournalEntry, OpKind};
use crate::proof::{self, ProofRegistry};
use crate::store::{BlockStore, StoreConfig, StoreError};
use crate::txn::{Transaction, TxnMode};

/// Database configuration
#[derive(Debug, Clone, Default)]
pub struct DbConfig {
    pub store: StoreConfig,
}

pub(crate) struct Engine {
    pub(crate) store: BlockStore,
    pub(crate) journal: Journal,
}

pub(crate) struct DbInner {
    pub(crate) engine: Mutex<Engine>,
    pub(crate) registry: Arc<ProofRegistry>,
}

/// An open database
pub struct Database {
    inner: Arc<DbInner>,
}

impl Database {
    /// Open the store at `path` with default configuration, creating it
    /// if absent. Reconciles any journal-ahead state left by a crash
    /// before returning.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_with(path, DbConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: DbConfig) -> DbResult<Self> {
        let store = BlockStore::open(path, config.store)?;
        let journal = Journal::from_superblock(store.superblock());

        let mut engine = Engine { store, journal };
        let replayed = reconcile(&mut engine)?;
        if replayed > 0 {
            tracing::info!(replayed, "replayed journal entries from unfinished commit");
        }

        Ok(Self {
            inner: Arc::new(DbInner {
                engine: Mutex::new(engine),
                registry: proof::shared_registry(),
            }),
        })
    }

    /// Flush and drop the handle. Open transactions on this handle keep
    /// the underlying store alive until they are dropped too.
    pub fn close(self) -> DbResult<()> {
        let engine = self.inner.engine.lock();
        engine.store.sync_data()?;
        Ok(())
    }

    /// Begin a transaction in the given mode.
    pub fn begin(&self, mode: TxnMode) -> Transaction {
        Transaction::new(self.inner.clone(), mode)
    }

    /// The proof verifier registry consulted by this handle's
    /// transactions.
    pub fn registry(&self) -> &Arc<ProofRegistry> {
        &self.inner.registry
    }

    /// Every live block of `block_type`, via full scan.
    pub fn read_blocks(&self, block_type: BlockType) -> DbResult<Vec<BlockInfo>> {
        let engine = self.inner.engine.lock();
        Ok(introspect::read_blocks_by_type(&engine.store, block_type)?)
    }

    /// [`read_blocks`](Self::read_blocks) rendered as a JSON array.
    pub fn read_blocks_json(&self, block_type: BlockType) -> DbResult<String> {
        let engine = self.inner.engine.lock();
        let blocks = introspect::read_blocks_by_type(&engine.store, block_type)?;
        Ok(introspect::blocks_to_json(&blocks)?)
    }

    /// Canonical text rendering of one block.
    pub fn render_block(&self, id: BlockId, opts: &RenderOpts) -> DbResult<String> {
        let engine = self.inner.engine.lock();
        Ok(introspect::render_block(&engine.store, id, opts)?)
    }

    /// Journal history since sequence `since`, oldest first.
    pub fn render_journal(&self, since: u64, opts: &RenderOpts) -> DbResult<String> {
        let engine = self.inner.engine.lock();
        Ok(engine.journal.render_since(&engine.store, since, opts)?)
    }

    /// Committed journal entries since sequence `since`, oldest first.
    pub fn journal_entries(&self, since: u64) -> DbResult<Vec<JournalEntry>> {
        let engine = self.inner.engine.lock();
        Ok(engine.journal.entries_since(&engine.store, since)?)
    }

    /// Verify the whole journal chain; returns the entry count.
    pub fn verify_journal(&self) -> DbResult<u64> {
        let engine = self.inner.engine.lock();
        Ok(engine.journal.verify_chain(&engine.store)?)
    }

    /// Schema report from scanning schema blocks.
    pub fn introspect_schema(&self) -> DbResult<String> {
        let engine = self.inner.engine.lock();
        Ok(introspect::introspect_schema(&engine.store)?)
    }

    /// Constraint report from scanning schema blocks.
    pub fn introspect_constraints(&self) -> DbResult<String> {
        let engine = self.inner.engine.lock();
        Ok(introspect::introspect_constraints(&engine.store)?)
    }

    /// Full-store integrity sweep; returns ids of blocks that fail
    /// decode or checksum verification.
    pub fn verify_checksums(&self) -> DbResult<Vec<BlockId>> {
        let engine = self.inner.engine.lock();
        let mut corrupt = Vec::new();
        for id in 0..engine.store.block_count() {
            match engine.store.read(id) {
                Ok(_) => {}
                Err(StoreError::NotFound { .. }) => {}
                Err(e) if e.is_corruption() => corrupt.push(id),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(corrupt)
    }

    /// Total blocks, superblock included
    pub fn block_count(&self) -> u64 {
        self.inner.engine.lock().store.block_count()
    }

    /// Reusable freed slots
    pub fn free_count(&self) -> usize {
        self.inner.engine.lock().store.free_count()
    }

    /// Most recently committed journal block id (0 = empty journal)
    pub fn journal_tail(&self) -> BlockId {
        self.inner.engine.lock().journal.tail()
    }
}

/// Reconcile a journal-ahead store.
///
/// A crash between commit phases 2 and 6 leaves journal blocks durable
/// while the superblock still points at the previous tail. Those orphan
/// entries carry full operation payloads, so they are re-applied here and
/// the superblock advanced past them. Replay follows the chain's prev
/// links forward from the committed tail (block ids are not an ordering:
/// a journal block can sit on a reused low slot); orphans off that path
/// never finished their commit and are scrubbed, as is anything past an
/// unreadable or undecodable link.
fn reconcile(engine: &mut Engine) -> DbResult<u64> {
    let physical = engine.store.physical_block_count()?;
    let reachable: HashSet<BlockId> = engine
        .journal
        .reachable(&engine.store)?
        .into_iter()
        .collect();

    // Orphans: journal-typed blocks in the file that the committed chain
    // does not reach, with their prev link and (if decodable) entry
    let mut orphans: Vec<(BlockId, BlockId, Option<JournalEntry>)> = Vec::new();
    for id in 1..physical {
        match engine.store.read_header_unchecked(id) {
            Ok(h) if h.block_type == BlockType::Journal && !reachable.contains(&id) => {
                let entry = match engine.store.read_unchecked(id) {
                    Ok(block) => serde_json::from_slice::<JournalEntry>(&block.payload).ok(),
                    Err(_) => None,
                };
                orphans.push((id, h.prev, entry));
            }
            Ok(_) => {}
            // Unreadable slots past the durable count are dealt with in
            // the gap sweep below.
            Err(_) => {}
        }
    }

    let mut replayed = 0u64;
    let mut scrubbed = 0u64;
    if !orphans.is_empty() {
        tracing::warn!(
            orphans = orphans.len(),
            "journal ahead of superblock; reconciling"
        );

        let mut adopted: HashSet<BlockId> = HashSet::new();
        let mut head = engine.journal.head();
        let mut cursor = engine.journal.tail();
        let mut max_seq = 0u64;

        // Extend the chain one link at a time: the next orphan is the one
        // whose prev points at the current tail.
        loop {
            let next = orphans.iter().find_map(|(id, prev, entry)| match entry {
                Some(e) if *prev == cursor && !adopted.contains(id) => Some((*id, e.clone())),
                _ => None,
            });
            let Some((id, entry)) = next else { break };

            replay_entry(engine, &entry)?;
            engine.store.extend_to(id + 1);
            adopted.insert(id);
            if head == 0 {
                head = id;
            }
            cursor = id;
            max_seq = max_seq.max(entry.seq);
            replayed += 1;
        }

        engine.journal.advance(head, cursor);
        engine.journal.observe_seq(max_seq);

        for (id, _, _) in &orphans {
            if !adopted.contains(id) {
                tracing::warn!(id, "scrubbing orphan journal block");
                scrub(engine, *id)?;
                scrubbed += 1;
            }
        }
    }

    // Scrub zero-gap slots below the (possibly extended) count so later
    // free-list scans see a classifiable header in every slot.
    for id in 1..engine.store.block_count() {
        if matches!(
            engine.store.read_header_unchecked(id),
            Err(StoreError::Block(_))
        ) {
            scrub(engine, id)?;
        }
    }

    if replayed > 0 || scrubbed > 0 {
        // Adopted chain must verify before the superblock advances.
        engine.journal.verify_chain(&engine.store)?;
        engine.store.write_superblock(
            engine.journal.head(),
            engine.journal.tail(),
            engine.journal.next_seq(),
        )?;
        engine.store.sync_data()?;
    }

    Ok(replayed)
}

fn scrub(engine: &mut Engine, id: BlockId) -> DbResult<()> {
    engine.store.extend_to(id + 1);
    engine.store.free(id)?;
    Ok(())
}

fn replay_entry(engine: &mut Engine, entry: &JournalEntry) -> DbResult<()> {
    match entry.op {
        OpKind::Insert | OpKind::Update => {
            let block_type = BlockType::from_name(&entry.block_type).ok_or_else(|| {
                DbError::InvalidArgument(format!(
                    "journal entry {} names unknown block type {:?}",
                    entry.seq, entry.block_type
                ))
            })?;
            let payload = entry.payload_bytes().ok_or_else(|| {
                DbError::InvalidArgument(format!("journal entry {} has no payload", entry.seq))
            })?;

            engine.store.extend_to(entry.block_id + 1);
            let block = Block::new(block_type, payload).map_err(StoreError::from)?;
            engine.store.write(entry.block_id, &block)?;
        }
        OpKind::Delete => {
            engine.store.extend_to(entry.block_id + 1);
            engine.store.free(entry.block_id)?;
        }
    }
    tracing::debug!(seq = entry.seq, op = ?entry.op, block = entry.block_id, "replayed journal entry");
    Ok(())
}
