//! Append-only journal chain
//!
//! Journal entries live in journal-typed blocks linked to their
//! predecessor through the block header's prev field, forming a singly
//! linked chain from the tail (newest) back to the head (oldest). Entries
//! are immutable once written and are never freed.
//!
//! The journal deliberately does not advance the superblock's tail
//! pointer; that is the commit protocol's job, so that journal append and
//! superblock update stay atomic with respect to the commit phases.

pub mod entry;
pub mod error;

pub use entry::{JournalEntry, OpKind};
pub use error::{JournalError, JournalResult};

use crate::block::{Block, BlockId, BlockType};
use crate::introspect::RenderOpts;
use crate::store::{BlockStore, Superblock};

/// Cached journal chain pointers for an open store
///
/// Sequence numbers are independent of block ids: a journal block can
/// land on a reused low slot (freed by an earlier delete), but `next_seq`
/// only ever grows, so entry order is always the sequence order.
#[derive(Debug, Clone, Copy)]
pub struct Journal {
    head: BlockId,
    tail: BlockId,
    next_seq: u64,
}

impl Journal {
    /// Load chain pointers from a superblock
    pub fn from_superblock(sb: &Superblock) -> Self {
        Self {
            head: sb.journal_head,
            tail: sb.journal_tail,
            next_seq: sb.next_seq,
        }
    }

    /// Oldest entry's block id (0 = empty journal)
    pub fn head(&self) -> BlockId {
        self.head
    }

    /// Newest entry's block id (0 = empty journal)
    pub fn tail(&self) -> BlockId {
        self.tail
    }

    /// Sequence number the next appended entry will carry
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Append an entry as a new journal block chained to the current
    /// tail. The block is written but not flushed; the caller owns the
    /// flush point (commit phase 2) and the superblock update (phase 5).
    pub fn append(
        &mut self,
        store: &mut BlockStore,
        mut entry: JournalEntry,
    ) -> JournalResult<BlockId> {
        let id = store.allocate();
        entry.seq = self.next_seq;

        let payload = serde_json::to_vec(&entry)?;
        let block = Block::chained(BlockType::Journal, self.tail, payload)
            .map_err(crate::store::StoreError::from)?;
        store.write(id, &block)?;

        self.next_seq += 1;
        if self.head == 0 {
            self.head = id;
        }
        self.tail = id;

        tracing::debug!(id, seq = entry.seq, op = ?entry.op, "journal append");
        Ok(id)
    }

    /// Walk the chain from the tail back to the first entry with
    /// sequence number `since` or below (exclusive), returning entries
    /// oldest-first. Sequence numbers strictly decrease toward the head,
    /// so the walk stops as soon as it passes `since`.
    pub fn entries_since(
        &self,
        store: &BlockStore,
        since: u64,
    ) -> JournalResult<Vec<JournalEntry>> {
        Ok(self
            .collect_since(store, since)?
            .into_iter()
            .map(|(_, _, entry)| entry)
            .collect())
    }

    /// Render the chain since sequence `since` as text, oldest entry
    /// first, one JSON document per line.
    pub fn render_since(
        &self,
        store: &BlockStore,
        since: u64,
        opts: &RenderOpts,
    ) -> JournalResult<String> {
        let mut out = String::new();

        for (id, prev, entry) in self.collect_since(store, since)? {
            let line = if opts.include_metadata {
                serde_json::to_string(&serde_json::json!({
                    "seq": entry.seq,
                    "block_id": id,
                    "prev": prev,
                    "entry": entry,
                }))?
            } else {
                serde_json::to_string(&entry)?
            };
            out.push_str(&line);
            out.push('\n');
        }

        Ok(out)
    }

    /// Chain walk shared by the history surfaces: `(block id, prev block
    /// id, entry)` triples, oldest first, entries with seq > `since`.
    fn collect_since(
        &self,
        store: &BlockStore,
        since: u64,
    ) -> JournalResult<Vec<(BlockId, BlockId, JournalEntry)>> {
        let mut items = Vec::new();
        let mut cursor = self.tail;

        while cursor != 0 {
            let block = store.read(cursor)?;
            if block.block_type != BlockType::Journal {
                return Err(JournalError::NotJournal { id: cursor });
            }
            let entry: JournalEntry = serde_json::from_slice(&block.payload)?;
            if entry.seq <= since {
                break;
            }
            items.push((cursor, block.prev, entry));
            cursor = block.prev;
        }

        items.reverse();
        Ok(items)
    }

    /// Verify every entry's predecessor link resolves, checksums
    /// validate, and sequence numbers strictly decrease toward the head.
    /// Returns the number of verified entries; a broken link is an
    /// error, never skipped.
    pub fn verify_chain(&self, store: &BlockStore) -> JournalResult<u64> {
        let mut count = 0u64;
        let mut cursor = self.tail;
        let mut last_seq: Option<u64> = None;

        while cursor != 0 {
            let block = store.read(cursor).map_err(|e| JournalError::BrokenChain {
                at: cursor,
                reason: e.to_string(),
            })?;
            if block.block_type != BlockType::Journal {
                return Err(JournalError::BrokenChain {
                    at: cursor,
                    reason: format!("linked block has type {}", block.block_type.name()),
                });
            }
            let entry: JournalEntry = serde_json::from_slice(&block.payload)?;
            if last_seq.is_some_and(|s| entry.seq >= s) {
                return Err(JournalError::BrokenChain {
                    at: cursor,
                    reason: format!("sequence {} does not precede {:?}", entry.seq, last_seq),
                });
            }
            last_seq = Some(entry.seq);
            count += 1;
            if cursor == self.head {
                if block.prev != 0 {
                    return Err(JournalError::BrokenChain {
                        at: cursor,
                        reason: "head entry has a predecessor link".to_string(),
                    });
                }
                break;
            }
            cursor = block.prev;
        }

        Ok(count)
    }

    /// Block ids reachable by walking the committed chain from the tail.
    /// Used at open to tell committed journal blocks from orphans left by
    /// a crash between commit phases 2 and 6.
    pub fn reachable(&self, store: &BlockStore) -> JournalResult<Vec<BlockId>> {
        let mut ids = Vec::new();
        let mut cursor = self.tail;
        while cursor != 0 {
            let block = store.read(cursor)?;
            if block.block_type != BlockType::Journal {
                return Err(JournalError::NotJournal { id: cursor });
            }
            ids.push(cursor);
            cursor = block.prev;
        }
        Ok(ids)
    }

    /// Adopt new chain pointers after a commit or replay advanced them.
    pub fn advance(&mut self, head: BlockId, tail: BlockId) {
        self.head = head;
        self.tail = tail;
    }

    /// Ensure the sequence counter is past `seq` (replay adopted an
    /// entry that consumed it).
    pub fn observe_seq(&mut self, seq: u64) {
        if seq >= self.next_seq {
            self.next_seq = seq + 1;
        }
    }
}
