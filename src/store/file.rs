//! File-backed block store
//!
//! Maps logical block ids to fixed offsets (`id * 4096`) in a single
//! backing file, using positional I/O (`pread`/`pwrite`) so reads never
//! touch a shared cursor. Block 0 is the superblock; everything else is
//! allocated on demand, with freed slots tracked in an in-memory free
//! list and reused before the file grows (compaction by reuse).
//!
//! Allocation and free-list changes are not independently durable. They
//! become durable only when a transaction commit writes the affected
//! blocks and flushes the superblock; the free list is rebuilt at open
//! by scanning block headers for `Free` type tags.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::block::{Block, BlockHeader, BlockId, BlockType, BLOCK_SIZE};
use crate::store::error::{StoreError, StoreResult};
use crate::store::superblock::Superblock;

/// Block store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Call `fdatasync` at commit flush points
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
        }
    }
}

/// A file-backed allocator of fixed-size blocks
pub struct BlockStore {
    file: File,
    path: PathBuf,
    config: StoreConfig,
    /// Total blocks including the superblock; the durable copy lives in
    /// the superblock and lags this value until the next commit.
    block_count: u64,
    /// Freed slots available for reuse, most recently freed last
    free_list: Vec<BlockId>,
    superblock: Superblock,
}

impl BlockStore {
    /// Open a store at `path`, creating a fresh one if the file does not
    /// exist or is empty.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.metadata()?.len() == 0 {
            Self::init_fresh(file, path.to_path_buf(), config)
        } else {
            Self::load(file, path.to_path_buf(), config)
        }
    }

    fn init_fresh(file: File, path: PathBuf, config: StoreConfig) -> StoreResult<Self> {
        let superblock = Superblock::fresh();
        let block = Block::new(BlockType::Superblock, superblock.encode())?;
        file.write_all_at(&block.encode(), 0)?;
        file.sync_data()?;

        tracing::info!(path = %path.display(), "created block store");

        Ok(Self {
            file,
            path,
            config,
            block_count: 1,
            free_list: Vec::new(),
            superblock,
        })
    }

    fn load(file: File, path: PathBuf, config: StoreConfig) -> StoreResult<Self> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        file.read_exact_at(&mut buf, 0)?;

        let root = Block::decode(&buf)?;
        if root.block_type != BlockType::Superblock {
            return Err(StoreError::InvalidSuperblock(format!(
                "block 0 has type {}",
                root.block_type.name()
            )));
        }
        let superblock = Superblock::decode(&root.payload)?;

        let mut store = Self {
            file,
            path,
            config,
            block_count: superblock.block_count,
            free_list: Vec::new(),
            superblock,
        };
        store.rebuild_free_list()?;

        tracing::info!(
            path = %store.path.display(),
            blocks = store.block_count,
            free = store.free_list.len(),
            "opened block store"
        );

        Ok(store)
    }

    /// Scan block headers to rebuild the free list.
    ///
    /// Checksums are not verified here; a slot only needs a readable
    /// header to be classified. Payload integrity is enforced on every
    /// [`read`](Self::read).
    fn rebuild_free_list(&mut self) -> StoreResult<()> {
        for id in 1..self.block_count {
            match self.read_header(id) {
                Ok(header) if header.block_type == BlockType::Free => self.free_list.push(id),
                Ok(_) => {}
                // A slot past the durable superblock may be half-written
                // after a crash; replay at open reconciles it.
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Reserve a block id, reusing a freed slot if one exists.
    ///
    /// The reservation is in-memory only; nothing is durable until the
    /// block is written and a commit flushes the superblock.
    pub fn allocate(&mut self) -> BlockId {
        if let Some(id) = self.free_list.pop() {
            tracing::debug!(id, "allocated block from free list");
            id
        } else {
            let id = self.block_count;
            self.block_count += 1;
            tracing::debug!(id, "allocated block by extension");
            id
        }
    }

    /// Undo an in-memory [`allocate`](Self::allocate) that was never
    /// committed (transaction abort or commit failure).
    pub fn release(&mut self, id: BlockId) {
        if id + 1 == self.block_count {
            self.block_count -= 1;
        } else {
            self.free_list.push(id);
        }
    }

    /// Read and verify the block at `id`.
    pub fn read(&self, id: BlockId) -> StoreResult<Block> {
        self.check_bounds(id)?;

        let mut buf = vec![0u8; BLOCK_SIZE];
        match self.file.read_exact_at(&mut buf, id * BLOCK_SIZE as u64) {
            Ok(()) => {}
            // Allocated but never written: invisible until commit
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(StoreError::NotFound { id });
            }
            Err(e) => return Err(e.into()),
        }

        let block = Block::decode(&buf)?;
        if block.block_type == BlockType::Free {
            return Err(StoreError::NotFound { id });
        }
        Ok(block)
    }

    /// Read only the header at `id`, without checksum verification.
    pub fn read_header(&self, id: BlockId) -> StoreResult<BlockHeader> {
        self.check_bounds(id)?;

        let mut buf = vec![0u8; crate::block::HEADER_SIZE];
        match self.file.read_exact_at(&mut buf, id * BLOCK_SIZE as u64) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(StoreError::NotFound { id });
            }
            Err(e) => return Err(e.into()),
        }

        Ok(BlockHeader::decode(&buf)?)
    }

    /// Overwrite the block at `id` in place.
    pub fn write(&mut self, id: BlockId, block: &Block) -> StoreResult<()> {
        self.check_bounds(id)?;
        self.file.write_all_at(&block.encode(), id * BLOCK_SIZE as u64)?;
        Ok(())
    }

    /// Return `id` to the free list, writing a zeroed free-slot block so
    /// the freed state survives reopen.
    pub fn free(&mut self, id: BlockId) -> StoreResult<()> {
        self.check_bounds(id)?;
        self.file
            .write_all_at(&Block::free_slot().encode(), id * BLOCK_SIZE as u64)?;
        self.free_list.push(id);
        tracing::debug!(id, "freed block");
        Ok(())
    }

    /// Flush written data to durable storage. One of the two blocking
    /// points in the commit protocol.
    pub fn sync_data(&self) -> StoreResult<()> {
        if self.config.sync_on_commit {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Persist the superblock with the current block count, the given
    /// journal chain pointers, and the journal's sequence counter. Does
    /// not flush.
    pub fn write_superblock(
        &mut self,
        journal_head: BlockId,
        journal_tail: BlockId,
        next_seq: u64,
    ) -> StoreResult<()> {
        self.superblock.block_count = self.block_count;
        self.superblock.journal_head = journal_head;
        self.superblock.journal_tail = journal_tail;
        self.superblock.next_seq = next_seq;

        let block = Block::new(BlockType::Superblock, self.superblock.encode())?;
        self.file.write_all_at(&block.encode(), 0)?;
        Ok(())
    }

    /// Current superblock contents (in-memory copy)
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// Total blocks including the superblock
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Blocks physically present in the backing file. After a crash this
    /// can exceed [`block_count`](Self::block_count): journal and data
    /// blocks written by an unfinished commit live past the durable
    /// superblock's count until reconciliation adopts or scrubs them.
    pub fn physical_block_count(&self) -> StoreResult<u64> {
        Ok(self.file.metadata()?.len() / BLOCK_SIZE as u64)
    }

    /// Grow the logical block count to cover replayed blocks.
    pub(crate) fn extend_to(&mut self, count: u64) {
        if count > self.block_count {
            self.block_count = count;
        }
    }

    /// Read past the logical block count, for reconciliation scans only.
    pub(crate) fn read_unchecked(&self, id: BlockId) -> StoreResult<Block> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        match self.file.read_exact_at(&mut buf, id * BLOCK_SIZE as u64) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(StoreError::NotFound { id });
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Block::decode(&buf)?)
    }

    /// Header read past the logical block count, for reconciliation.
    pub(crate) fn read_header_unchecked(&self, id: BlockId) -> StoreResult<BlockHeader> {
        let mut buf = vec![0u8; crate::block::HEADER_SIZE];
        match self.file.read_exact_at(&mut buf, id * BLOCK_SIZE as u64) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(StoreError::NotFound { id });
            }
            Err(e) => return Err(e.into()),
        }
        Ok(BlockHeader::decode(&buf)?)
    }

    /// Number of reusable freed slots
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_bounds(&self, id: BlockId) -> StoreResult<()> {
        if id >= self.block_count {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir, name: &str) -> BlockStore {
        BlockStore::open(dir.path().join(name), StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_fresh_store_has_superblock_only() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "fresh.fdb");
        assert_eq!(store.block_count(), 1);
        assert_eq!(store.free_count(), 0);
    }

    #[test]
    fn test_allocate_write_read() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, "rw.fdb");

        let id = store.allocate();
        assert_eq!(id, 1);
        let block = Block::new(BlockType::Document, b"hello".to_vec()).unwrap();
        store.write(id, &block).unwrap();

        let read = store.read(id).unwrap();
        assert_eq!(read.payload, b"hello");
        assert_eq!(read.block_type, BlockType::Document);
    }

    #[test]
    fn test_read_unallocated_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "missing.fdb");
        assert!(matches!(
            store.read(99),
            Err(StoreError::NotFound { id: 99 })
        ));
    }

    #[test]
    fn test_read_allocated_but_unwritten_is_not_found() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, "pending.fdb");
        let id = store.allocate();
        assert!(matches!(store.read(id), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_free_then_reallocate_reuses_slot() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, "reuse.fdb");

        let id = store.allocate();
        let block = Block::new(BlockType::Document, b"doomed".to_vec()).unwrap();
        store.write(id, &block).unwrap();
        store.free(id).unwrap();

        assert!(matches!(store.read(id), Err(StoreError::NotFound { .. })));
        assert_eq!(store.allocate(), id);
    }

    #[test]
    fn test_release_tail_allocation_shrinks() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, "release.fdb");
        let id = store.allocate();
        store.release(id);
        assert_eq!(store.block_count(), 1);
    }

    #[test]
    fn test_free_list_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.fdb");

        {
            let mut store = BlockStore::open(&path, StoreConfig::default()).unwrap();
            let a = store.allocate();
            let b = store.allocate();
            let block = Block::new(BlockType::Document, b"x".to_vec()).unwrap();
            store.write(a, &block).unwrap();
            store.write(b, &block).unwrap();
            store.free(a).unwrap();
            store.write_superblock(0, 0, 1).unwrap();
            store.sync_data().unwrap();
        }

        let store = BlockStore::open(&path, StoreConfig::default()).unwrap();
        assert_eq!(store.block_count(), 3);
        assert_eq!(store.free_count(), 1);
    }
}
