//! Cross-checks between the bitmaps, the superblock, and the pointer graph.
//!
//! The engine keeps these in agreement on every operation; `verify` exists so
//! tests and the stress driver can prove it after the fact.

use crate::AllocEngine;
use esim_inode::Block;
use esim_types::{BlockId, DIRECT_POINTERS, InodeId, TOTAL_BLOCKS, TOTAL_INODES};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// One violated engine invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inconsistency {
    #[error("superblock {field} is {recorded}, bitmaps give {derived}")]
    SuperblockCounter {
        field: &'static str,
        recorded: u32,
        derived: u32,
    },

    #[error("block {block} occupied={occupied} but bitmap bit is {marked}")]
    BlockFlag {
        block: BlockId,
        occupied: bool,
        marked: bool,
    },

    #[error("inode {inode} in_use={in_use} but bitmap bit is {marked}")]
    InodeFlag {
        inode: InodeId,
        in_use: bool,
        marked: bool,
    },

    /// A free inode holding pointers, or an in-use inode holding none.
    #[error("inode {inode} in_use={in_use} but has_blocks={has_blocks}")]
    InodeBlocks {
        inode: InodeId,
        in_use: bool,
        has_blocks: bool,
    },

    #[error("inode {inode} points at block {block}, which is not marked")]
    UnmarkedTarget { inode: InodeId, block: BlockId },

    #[error("block {block} is claimed by inode {first} and inode {second}")]
    SharedBlock {
        block: BlockId,
        first: InodeId,
        second: InodeId,
    },

    #[error("inode {inode} records {recorded} blocks, pointers resolve to {resolved}")]
    BlockCount {
        inode: InodeId,
        recorded: u32,
        resolved: usize,
    },

    #[error("inode {inode} has {direct} direct pointers and indirect={has_indirect} for {blocks_used} blocks")]
    IndirectPlacement {
        inode: InodeId,
        blocks_used: u32,
        direct: usize,
        has_indirect: bool,
    },

    #[error("inode {inode} indirect block {block} holds no pointer table")]
    MissingIndirectTable { inode: InodeId, block: BlockId },

    #[error("block {block} is marked but no inode references it")]
    OrphanBlock { block: BlockId },
}

impl AllocEngine {
    /// Every invariant violation currently present. Empty on a healthy engine.
    #[must_use]
    pub fn verify(&self) -> Vec<Inconsistency> {
        let mut found = Vec::new();
        self.check_superblock(&mut found);
        self.check_flags(&mut found);
        self.check_pointers(&mut found);
        for finding in &found {
            warn!(%finding, "consistency check failed");
        }
        found
    }

    fn check_superblock(&self, found: &mut Vec<Inconsistency>) {
        let counters = [
            (
                "free_inodes",
                self.superblock.free_inodes,
                TOTAL_INODES - self.inode_bitmap.count_set(),
            ),
            (
                "free_blocks",
                self.superblock.free_blocks,
                TOTAL_BLOCKS - self.block_bitmap.count_set(),
            ),
        ];
        for (field, recorded, derived) in counters {
            if recorded != derived {
                found.push(Inconsistency::SuperblockCounter {
                    field,
                    recorded,
                    derived,
                });
            }
        }
    }

    fn check_flags(&self, found: &mut Vec<Inconsistency>) {
        for block in self.blocks.iter() {
            let marked = self.block_bitmap.is_set(block.id.0);
            if block.occupied != marked {
                found.push(Inconsistency::BlockFlag {
                    block: block.id,
                    occupied: block.occupied,
                    marked,
                });
            }
        }
        for inode in self.inodes.iter() {
            let marked = self.inode_bitmap.is_set(inode.id.0);
            if inode.in_use != marked {
                found.push(Inconsistency::InodeFlag {
                    inode: inode.id,
                    in_use: inode.in_use,
                    marked,
                });
            }
        }
    }

    fn check_pointers(&self, found: &mut Vec<Inconsistency>) {
        let mut owners: Vec<Option<InodeId>> = vec![None; TOTAL_BLOCKS as usize];

        for inode in self.inodes.iter() {
            let has_blocks = !inode.has_no_blocks();
            if inode.in_use != has_blocks {
                found.push(Inconsistency::InodeBlocks {
                    inode: inode.id,
                    in_use: inode.in_use,
                    has_blocks,
                });
            }
            if !inode.in_use {
                continue;
            }

            let data = self.blocks.resolve(inode);
            if data.len() != inode.blocks_used as usize {
                found.push(Inconsistency::BlockCount {
                    inode: inode.id,
                    recorded: inode.blocks_used,
                    resolved: data.len(),
                });
            }

            let direct = inode.direct_blocks().count();
            let blocks_used = inode.blocks_used as usize;
            if direct != blocks_used.min(DIRECT_POINTERS)
                || inode.uses_indirect() != (blocks_used > DIRECT_POINTERS)
            {
                found.push(Inconsistency::IndirectPlacement {
                    inode: inode.id,
                    blocks_used: inode.blocks_used,
                    direct,
                    has_indirect: inode.uses_indirect(),
                });
            }

            if let Some(block) = inode.indirect {
                if !self.blocks.get(block).is_some_and(Block::is_indirect) {
                    found.push(Inconsistency::MissingIndirectTable {
                        inode: inode.id,
                        block,
                    });
                }
            }

            for block in data.iter().copied().chain(inode.indirect) {
                if !self.block_bitmap.is_set(block.0) {
                    found.push(Inconsistency::UnmarkedTarget {
                        inode: inode.id,
                        block,
                    });
                }
                if let Some(owner) = owners.get_mut(block.index()) {
                    match *owner {
                        Some(first) => found.push(Inconsistency::SharedBlock {
                            block,
                            first,
                            second: inode.id,
                        }),
                        None => *owner = Some(inode.id),
                    }
                }
            }
        }

        for idx in self.block_bitmap.iter_set() {
            let block = BlockId(idx);
            if owners.get(block.index()).copied().flatten().is_none() {
                found.push(Inconsistency::OrphanBlock { block });
            }
        }
    }
}
