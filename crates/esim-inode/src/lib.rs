#![forbid(unsafe_code)]
//! In-memory metadata records: superblock, inode table, and block pool.
//!
//! These are plain data structures. They never consult the allocation
//! bitmaps; keeping them in agreement with the bitmaps is the engine's job.
//! Pointer slots use `Option<BlockId>`, where `None` is an empty slot.

use esim_types::{
    BLOCK_SIZE, BlockId, DIRECT_POINTERS, INDIRECT_POINTER_CAPACITY, InodeId, TOTAL_BLOCKS,
    TOTAL_INODES, Timestamp,
};
use serde::{Deserialize, Serialize};

// ── Superblock ──────────────────────────────────────────────────────────────

/// Aggregate counters derived from the bitmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub total_inodes: u32,
    pub total_blocks: u32,
    pub free_inodes: u32,
    pub free_blocks: u32,
    pub block_size: u32,
}

impl Superblock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_inodes: TOTAL_INODES,
            total_blocks: TOTAL_BLOCKS,
            free_inodes: TOTAL_INODES,
            free_blocks: TOTAL_BLOCKS,
            block_size: BLOCK_SIZE,
        }
    }

    /// Recompute the free counters from the number of set bitmap bits.
    pub fn recompute(&mut self, used_inodes: u32, used_blocks: u32) {
        self.free_inodes = self.total_inodes.saturating_sub(used_inodes);
        self.free_blocks = self.total_blocks.saturating_sub(used_blocks);
    }

    #[must_use]
    pub fn used_inodes(&self) -> u32 {
        self.total_inodes - self.free_inodes
    }

    #[must_use]
    pub fn used_blocks(&self) -> u32 {
        self.total_blocks - self.free_blocks
    }
}

impl Default for Superblock {
    fn default() -> Self {
        Self::new()
    }
}

// ── Inode ───────────────────────────────────────────────────────────────────

/// One slot of the inode table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub id: InodeId,
    pub name: String,
    pub size_bytes: u64,
    /// Data blocks owned by the file; the indirect table block is not counted.
    pub blocks_used: u32,
    pub direct: [Option<BlockId>; DIRECT_POINTERS],
    pub indirect: Option<BlockId>,
    pub in_use: bool,
    pub created_at: Option<Timestamp>,
}

impl Inode {
    /// A free slot with every pointer cleared.
    #[must_use]
    pub fn empty(id: InodeId) -> Self {
        Self {
            id,
            name: String::new(),
            size_bytes: 0,
            blocks_used: 0,
            direct: [None; DIRECT_POINTERS],
            indirect: None,
            in_use: false,
            created_at: None,
        }
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        !self.in_use
    }

    /// Mark the slot occupied. Pointers are populated separately.
    pub fn occupy(&mut self, name: &str, size_bytes: u64, created_at: Timestamp) {
        self.in_use = true;
        self.name = name.to_owned();
        self.size_bytes = size_bytes;
        self.created_at = Some(created_at);
    }

    /// Reset the slot to its free state, keeping its identity.
    pub fn release(&mut self) {
        *self = Self::empty(self.id);
    }

    /// Whether every pointer slot is empty and no block is accounted.
    #[must_use]
    pub fn has_no_blocks(&self) -> bool {
        self.blocks_used == 0 && self.indirect.is_none() && self.direct.iter().all(Option::is_none)
    }

    /// Populated direct pointers in slot order.
    pub fn direct_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.direct.iter().flatten().copied()
    }

    #[must_use]
    pub fn uses_indirect(&self) -> bool {
        self.indirect.is_some()
    }
}

// ── Indirect pointer table ──────────────────────────────────────────────────

/// The pointer array held by a block serving as an indirect block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectTable {
    pointers: Box<[Option<BlockId>; INDIRECT_POINTER_CAPACITY]>,
}

impl IndirectTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pointers: Box::new([None; INDIRECT_POINTER_CAPACITY]),
        }
    }

    /// Store `block` in the first empty slot. Returns false when full.
    pub fn push(&mut self, block: BlockId) -> bool {
        match self.pointers.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(block);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, offset: usize) -> Option<BlockId> {
        self.pointers.get(offset).copied().flatten()
    }

    /// Populated pointers in slot order.
    pub fn iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.pointers.iter().flatten().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pointers.iter().all(Option::is_none)
    }

    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.pointers.contains(&Some(block))
    }
}

impl Default for IndirectTable {
    fn default() -> Self {
        Self::new()
    }
}

// ── Block ───────────────────────────────────────────────────────────────────

/// How a block's contents are interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BlockContent {
    /// Plain data; contents are not modelled.
    #[default]
    Data,
    /// Reinterpreted as a table of further block references.
    IndirectTable(IndirectTable),
}

/// One slot of the block pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub occupied: bool,
    pub content: BlockContent,
}

impl Block {
    #[must_use]
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            occupied: false,
            content: BlockContent::Data,
        }
    }

    pub fn occupy_data(&mut self) {
        self.occupied = true;
        self.content = BlockContent::Data;
    }

    /// Occupy the block as an indirect block holding `table`.
    pub fn occupy_indirect(&mut self, table: IndirectTable) {
        self.occupied = true;
        self.content = BlockContent::IndirectTable(table);
    }

    /// Free the block and drop any pointer table it held.
    pub fn release(&mut self) {
        self.occupied = false;
        self.content = BlockContent::Data;
    }

    #[must_use]
    pub fn indirect_table(&self) -> Option<&IndirectTable> {
        match &self.content {
            BlockContent::IndirectTable(table) => Some(table),
            BlockContent::Data => None,
        }
    }

    #[must_use]
    pub fn is_indirect(&self) -> bool {
        matches!(self.content, BlockContent::IndirectTable(_))
    }
}

// ── Tables ──────────────────────────────────────────────────────────────────

/// Fixed-capacity inode table indexed by `InodeId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeTable {
    inodes: Vec<Inode>,
}

impl InodeTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inodes: (0..TOTAL_INODES).map(|i| Inode::empty(InodeId(i))).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, id: InodeId) -> Option<&Inode> {
        self.inodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: InodeId) -> Option<&mut Inode> {
        self.inodes.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Inode> {
        self.inodes.iter()
    }

    /// In-use inodes in ascending id order.
    pub fn in_use(&self) -> impl Iterator<Item = &Inode> {
        self.inodes.iter().filter(|inode| inode.in_use)
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Inode> {
        self.in_use().find(|inode| inode.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-capacity block pool indexed by `BlockId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPool {
    blocks: Vec<Block>,
}

impl BlockPool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: (0..TOTAL_BLOCKS).map(|i| Block::new(BlockId(i))).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// The pointer table referenced by `inode`, if it has one.
    #[must_use]
    pub fn indirect_table_of(&self, inode: &Inode) -> Option<&IndirectTable> {
        inode
            .indirect
            .and_then(|id| self.get(id))
            .and_then(Block::indirect_table)
    }

    /// Every data block of `inode`: direct slots first, then the indirect table.
    #[must_use]
    pub fn resolve(&self, inode: &Inode) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = inode.direct_blocks().collect();
        if let Some(table) = self.indirect_table_of(inode) {
            ids.extend(table.iter());
        }
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superblock_recompute_from_usage() {
        let mut sb = Superblock::new();
        assert_eq!(sb.free_inodes, 32);
        assert_eq!(sb.free_blocks, 128);
        sb.recompute(2, 8);
        assert_eq!(sb.free_inodes, 30);
        assert_eq!(sb.free_blocks, 120);
        assert_eq!(sb.used_inodes(), 2);
        assert_eq!(sb.used_blocks(), 8);
    }

    #[test]
    fn inode_lifecycle() {
        let mut inode = Inode::empty(InodeId(4));
        assert!(inode.is_free());
        assert!(inode.has_no_blocks());

        inode.occupy("a.txt", 2048, Timestamp(1));
        inode.direct[0] = Some(BlockId(9));
        inode.direct[1] = Some(BlockId(10));
        inode.blocks_used = 2;
        assert!(!inode.is_free());
        assert!(!inode.has_no_blocks());
        assert_eq!(
            inode.direct_blocks().collect::<Vec<_>>(),
            vec![BlockId(9), BlockId(10)]
        );

        inode.release();
        assert_eq!(inode, Inode::empty(InodeId(4)));
    }

    #[test]
    fn indirect_table_fills_in_order() {
        let mut table = IndirectTable::new();
        assert!(table.is_empty());
        for i in 0..INDIRECT_POINTER_CAPACITY {
            assert!(table.push(BlockId(u32::try_from(i).unwrap())));
        }
        assert!(!table.push(BlockId(999)));
        assert_eq!(table.len(), INDIRECT_POINTER_CAPACITY);
        assert_eq!(table.get(0), Some(BlockId(0)));
        assert_eq!(table.get(255), Some(BlockId(255)));
        assert_eq!(table.get(256), None);
        assert!(table.contains(BlockId(17)));
    }

    #[test]
    fn block_reinterpretation_and_release() {
        let mut block = Block::new(BlockId(3));
        block.occupy_data();
        assert!(block.occupied);
        assert!(!block.is_indirect());

        let mut table = IndirectTable::new();
        table.push(BlockId(40));
        block.occupy_indirect(table);
        assert!(block.is_indirect());
        assert_eq!(block.indirect_table().map(IndirectTable::len), Some(1));

        block.release();
        assert!(!block.occupied);
        assert!(block.indirect_table().is_none());
    }

    #[test]
    fn pool_resolves_direct_then_indirect() {
        let mut pool = BlockPool::new();
        let mut inode = Inode::empty(InodeId(0));
        inode.occupy("big", 14 * 1024, Timestamp(1));
        for (slot, id) in inode.direct.iter_mut().zip(0..) {
            *slot = Some(BlockId(id));
        }
        inode.indirect = Some(BlockId(20));
        let mut table = IndirectTable::new();
        table.push(BlockId(12));
        table.push(BlockId(13));
        pool.get_mut(BlockId(20)).unwrap().occupy_indirect(table);

        let ids = pool.resolve(&inode);
        assert_eq!(ids.len(), 14);
        assert_eq!(ids[11], BlockId(11));
        assert_eq!(ids[12], BlockId(12));
        assert_eq!(ids[13], BlockId(13));
    }

    #[test]
    fn tables_have_fixed_capacity() {
        let inodes = InodeTable::new();
        let blocks = BlockPool::new();
        assert_eq!(inodes.len(), 32);
        assert_eq!(blocks.len(), 128);
        assert!(inodes.get(InodeId(32)).is_none());
        assert!(blocks.get(BlockId(128)).is_none());
        assert_eq!(inodes.in_use().count(), 0);
        assert!(inodes.find_by_name("missing").is_none());
    }
}
