#![forbid(unsafe_code)]
//! The allocation engine: inode table, block pool, and both bitmaps behind a
//! small set of file operations.
//!
//! ## Placement
//!
//! Every search is first-fit from index 0. A file of `n` blocks takes the `n`
//! lowest free blocks; the first twelve go to direct slots and the rest to an
//! indirect pointer table held in one more free block. Nothing tries to keep
//! a file contiguous, so deletes followed by creates fragment the disk.
//!
//! ## Failure model
//!
//! `create_file` validates and plans before mutating anything, so a rejected
//! call leaves the engine untouched. The single exception is the configurable
//! [`IndirectionFailurePolicy::LeakDirectBlocks`].

mod config;
mod history;
mod report;
mod shared;
mod verify;

pub use config::{EngineConfig, IndirectionFailurePolicy};
pub use history::{HistoryEntry, HistoryLog, OpKind, OpOutcome};
pub use report::{
    BlockKind, BlockState, EngineSnapshot, FileInfo, SYSTEM_OWNER, Statistics, count_breaks,
    fragmentation_percent, is_fragmented,
};
pub use shared::SharedEngine;
pub use verify::Inconsistency;

use esim_alloc::Bitmap;
use esim_error::{EsimError, Result};
use esim_inode::{Block, BlockPool, IndirectTable, Inode, InodeTable, Superblock};
use esim_types::{
    BlockId, DIRECT_POINTERS, InodeId, MAX_FILE_BLOCKS, MAX_NAME_LENGTH, TOTAL_BLOCKS,
    TOTAL_INODES, Timestamp, blocks_for_size, bytes_to_kib,
};
use tracing::{debug, info, warn};

/// Owned simulator state. Not synchronized; see [`SharedEngine`].
#[derive(Debug, Clone)]
pub struct AllocEngine {
    config: EngineConfig,
    superblock: Superblock,
    inodes: InodeTable,
    blocks: BlockPool,
    inode_bitmap: Bitmap,
    block_bitmap: Bitmap,
    history: HistoryLog,
}

impl Default for AllocEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AllocEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            superblock: Superblock::new(),
            inodes: InodeTable::new(),
            blocks: BlockPool::new(),
            inode_bitmap: Bitmap::new(TOTAL_INODES),
            block_bitmap: Bitmap::new(TOTAL_BLOCKS),
            history: HistoryLog::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    #[must_use]
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    #[must_use]
    pub fn inode_bitmap(&self) -> &Bitmap {
        &self.inode_bitmap
    }

    #[must_use]
    pub fn block_bitmap(&self) -> &Bitmap {
        &self.block_bitmap
    }

    #[must_use]
    pub fn inode(&self, id: InodeId) -> Option<&Inode> {
        self.inodes.get(id)
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    #[must_use]
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    // ── Create ──────────────────────────────────────────────────────────────

    /// Create a file of `size_bytes` and return the inode that holds it.
    pub fn create_file(&mut self, name: &str, size_bytes: u64) -> Result<InodeId> {
        match self.try_create(name, size_bytes) {
            Ok(id) => {
                self.history.record(
                    OpKind::Create,
                    name,
                    size_bytes,
                    Some(id),
                    OpOutcome::Accepted,
                );
                Ok(id)
            }
            Err(err) => {
                self.note_rejection(OpKind::Create, name, size_bytes, None, &err);
                Err(err)
            }
        }
    }

    fn try_create(&mut self, name: &str, size_bytes: u64) -> Result<InodeId> {
        let len = name.chars().count();
        if len == 0 {
            return Err(EsimError::EmptyName);
        }
        if len > MAX_NAME_LENGTH {
            return Err(EsimError::NameTooLong {
                len,
                max: MAX_NAME_LENGTH,
            });
        }
        if self.inodes.find_by_name(name).is_some() {
            return Err(EsimError::DuplicateName(name.to_owned()));
        }
        let inode_id = self
            .inode_bitmap
            .first_free()
            .map(InodeId)
            .ok_or(EsimError::NoFreeInode)?;
        if size_bytes == 0 {
            return Err(EsimError::EmptyFile);
        }

        let blocks_needed = blocks_for_size(size_bytes);
        let too_large = EsimError::FileTooLarge {
            blocks_needed,
            max: MAX_FILE_BLOCKS,
        };
        if blocks_needed > MAX_FILE_BLOCKS {
            return Err(too_large);
        }
        let want = usize::try_from(blocks_needed).map_err(|_| too_large)?;

        let data = self.block_bitmap.collect_free(want);
        if data.len() < want {
            return Err(EsimError::InsufficientBlocks {
                needed: blocks_needed,
                available: data.len() as u64,
            });
        }

        let indirect = if want > DIRECT_POINTERS {
            match self.block_bitmap.first_free_excluding(&data) {
                Some(idx) => Some(BlockId(idx)),
                None => {
                    self.apply_indirection_failure(&data);
                    return Err(EsimError::NoFreeBlockForIndirection);
                }
            }
        } else {
            None
        };

        Ok(self.commit_create(inode_id, name, size_bytes, &data, indirect))
    }

    fn commit_create(
        &mut self,
        inode_id: InodeId,
        name: &str,
        size_bytes: u64,
        data: &[u32],
        indirect: Option<BlockId>,
    ) -> InodeId {
        for &idx in data {
            self.mark_data_block(idx);
        }

        let (direct, overflow) = data.split_at(data.len().min(DIRECT_POINTERS));
        if let Some(indirect_id) = indirect {
            let mut table = IndirectTable::new();
            for &idx in overflow {
                table.push(BlockId(idx));
            }
            self.block_bitmap.set(indirect_id.0);
            if let Some(block) = self.blocks.get_mut(indirect_id) {
                block.occupy_indirect(table);
            }
        }

        if let Some(inode) = self.inodes.get_mut(inode_id) {
            inode.occupy(name, size_bytes, Timestamp::now());
            for (slot, &idx) in inode.direct.iter_mut().zip(direct) {
                *slot = Some(BlockId(idx));
            }
            inode.indirect = indirect;
            inode.blocks_used = u32::try_from(data.len()).unwrap_or(u32::MAX);
        }
        self.inode_bitmap.set(inode_id.0);
        self.sync_superblock();

        debug!(
            inode = inode_id.0,
            name,
            blocks = data.len(),
            indirect = ?indirect.map(|block| block.0),
            "file created"
        );
        inode_id
    }

    fn apply_indirection_failure(&mut self, data: &[u32]) {
        match self.config.indirection_failure {
            IndirectionFailurePolicy::Atomic => {}
            IndirectionFailurePolicy::LeakDirectBlocks => {
                let leaked = &data[..data.len().min(DIRECT_POINTERS)];
                for &idx in leaked {
                    self.mark_data_block(idx);
                }
                self.sync_superblock();
                warn!(
                    leaked = leaked.len(),
                    "indirect table allocation failed, direct blocks left marked"
                );
            }
        }
    }

    fn mark_data_block(&mut self, idx: u32) {
        self.block_bitmap.set(idx);
        if let Some(block) = self.blocks.get_mut(BlockId(idx)) {
            block.occupy_data();
        }
    }

    // ── Delete ──────────────────────────────────────────────────────────────

    /// Free the file held by `id` together with its indirect block.
    pub fn delete_file(&mut self, id: InodeId) -> Result<()> {
        match self.try_delete(id) {
            Ok(name) => {
                self.history
                    .record(OpKind::Delete, &name, 0, Some(id), OpOutcome::Accepted);
                Ok(())
            }
            Err(err) => {
                let resolved = id.is_valid().then_some(id);
                self.note_rejection(OpKind::Delete, "", 0, resolved, &err);
                Err(err)
            }
        }
    }

    /// Delete the in-use file named `name`.
    pub fn delete_by_name(&mut self, name: &str) -> Result<InodeId> {
        let Some(id) = self.find_by_name(name) else {
            let err = EsimError::NotFound(name.to_owned());
            self.note_rejection(OpKind::Delete, name, 0, None, &err);
            return Err(err);
        };
        self.delete_file(id)?;
        Ok(id)
    }

    fn try_delete(&mut self, id: InodeId) -> Result<String> {
        if !id.is_valid() {
            return Err(EsimError::InvalidInodeId(id.0));
        }
        let inode = self
            .inodes
            .get(id)
            .filter(|inode| inode.in_use)
            .ok_or(EsimError::InodeNotInUse(id.0))?;

        let data = self.blocks.resolve(inode);
        let indirect = inode.indirect;
        let name = inode.name.clone();

        for block_id in data.iter().copied().chain(indirect) {
            self.block_bitmap.clear(block_id.0);
            if let Some(block) = self.blocks.get_mut(block_id) {
                block.release();
            }
        }
        if let Some(inode) = self.inodes.get_mut(id) {
            inode.release();
        }
        self.inode_bitmap.clear(id.0);
        self.sync_superblock();

        debug!(inode = id.0, name = %name, blocks = data.len(), "file deleted");
        Ok(name)
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<InodeId> {
        self.inodes.find_by_name(name).map(|inode| inode.id)
    }

    /// Descriptor for one in-use inode.
    #[must_use]
    pub fn file_info(&self, id: InodeId) -> Option<FileInfo> {
        self.inodes
            .get(id)
            .filter(|inode| inode.in_use)
            .map(|inode| self.describe(inode))
    }

    /// Descriptors for every in-use inode, ascending by id.
    #[must_use]
    pub fn list_files(&self) -> Vec<FileInfo> {
        self.inodes
            .in_use()
            .map(|inode| self.describe(inode))
            .collect()
    }

    fn describe(&self, inode: &Inode) -> FileInfo {
        let block_ids = self.blocks.resolve(inode);
        FileInfo {
            id: inode.id,
            name: inode.name.clone(),
            size_kb: bytes_to_kib(inode.size_bytes),
            size_bytes: inode.size_bytes,
            is_fragmented: is_fragmented(&block_ids),
            block_count: inode.blocks_used,
            block_ids,
            uses_indirect: inode.uses_indirect(),
            indirect_block: inode.indirect,
            created_at: inode.created_at,
        }
    }

    /// External fragmentation over every multi-block file, as a percentage.
    #[must_use]
    pub fn disk_fragmentation(&self) -> f64 {
        let resolved: Vec<Vec<BlockId>> = self
            .inodes
            .in_use()
            .map(|inode| self.blocks.resolve(inode))
            .collect();
        fragmentation_percent(resolved.iter().map(Vec::as_slice))
    }

    /// Classify every block slot, in id order.
    #[must_use]
    pub fn disk_snapshot(&self) -> Vec<BlockState> {
        let files: Vec<(&Inode, Vec<BlockId>)> = self
            .inodes
            .in_use()
            .map(|inode| (inode, self.blocks.resolve(inode)))
            .collect();

        (0..TOTAL_BLOCKS)
            .map(BlockId)
            .map(|id| {
                if !self.block_bitmap.is_set(id.0) {
                    return BlockState {
                        id,
                        kind: BlockKind::Free,
                        owner: None,
                    };
                }
                if let Some((inode, _)) = files.iter().find(|(inode, _)| inode.indirect == Some(id))
                {
                    return BlockState {
                        id,
                        kind: BlockKind::Indirect,
                        owner: Some(inode.name.clone()),
                    };
                }
                let owner = files
                    .iter()
                    .find(|(_, ids)| ids.contains(&id))
                    .map_or(SYSTEM_OWNER, |(inode, _)| inode.name.as_str());
                BlockState {
                    id,
                    kind: BlockKind::Occupied,
                    owner: Some(owner.to_owned()),
                }
            })
            .collect()
    }

    #[must_use]
    pub fn statistics(&self) -> Statistics {
        Statistics {
            free_inodes: self.superblock.free_inodes,
            used_inodes: self.superblock.used_inodes(),
            free_blocks: self.superblock.free_blocks,
            used_blocks: self.superblock.used_blocks(),
            fragmentation: self.disk_fragmentation(),
            active_files: self.active_files(),
        }
    }

    /// Aggregates plus the full file list, stamped with the latest history seq.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        let files = self.list_files();
        let files_with_indirection = files.iter().filter(|file| file.uses_indirect).count();
        EngineSnapshot {
            operation: self.history.last_seq(),
            active_files: self.active_files(),
            occupied_blocks: self.superblock.used_blocks(),
            fragmentation: self.disk_fragmentation(),
            free_inodes: self.superblock.free_inodes,
            free_blocks: self.superblock.free_blocks,
            files_with_indirection: u32::try_from(files_with_indirection).unwrap_or(u32::MAX),
            files,
            taken_at: Timestamp::now(),
        }
    }

    fn active_files(&self) -> u32 {
        u32::try_from(self.inodes.in_use().count()).unwrap_or(u32::MAX)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Return to the freshly constructed state. The configuration is kept.
    pub fn reset(&mut self) {
        let discarded = self.history.len();
        *self = Self::new(self.config);
        info!(discarded_history = discarded, "engine reset");
    }

    fn sync_superblock(&mut self) {
        self.superblock.recompute(
            self.inode_bitmap.count_set(),
            self.block_bitmap.count_set(),
        );
    }

    fn note_rejection(
        &mut self,
        kind: OpKind,
        name: &str,
        size_bytes: u64,
        inode_id: Option<InodeId>,
        err: &EsimError,
    ) {
        debug!(op = kind.as_str(), name, size_bytes, error = %err, "operation rejected");
        if self.config.record_rejections {
            self.history
                .record(kind, name, size_bytes, inode_id, OpOutcome::rejected(err));
        }
    }
}
