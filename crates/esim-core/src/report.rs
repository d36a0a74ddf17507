//! Read-only views handed to front ends, and the fragmentation arithmetic.

use esim_types::{BlockId, InodeId, Timestamp, percentage};
use serde::{Deserialize, Serialize};

/// Number of adjacent pairs in `ids` that are not index-consecutive.
#[must_use]
pub fn count_breaks(ids: &[BlockId]) -> usize {
    ids.windows(2)
        .filter(|pair| !pair[0].is_followed_by(pair[1]))
        .count()
}

/// Whether a file's resolved block sequence has any gap.
#[must_use]
pub fn is_fragmented(ids: &[BlockId]) -> bool {
    count_breaks(ids) > 0
}

/// Disk fragmentation over a set of resolved block sequences.
///
/// Only sequences with more than one block participate. The result is
/// `breaks / blocks * 100`, rounded to two decimals, or 0 when nothing
/// participates.
#[must_use]
pub fn fragmentation_percent<'a>(files: impl IntoIterator<Item = &'a [BlockId]>) -> f64 {
    let mut breaks = 0_u64;
    let mut blocks = 0_u64;
    for ids in files {
        if ids.len() > 1 {
            breaks += count_breaks(ids) as u64;
            blocks += ids.len() as u64;
        }
    }
    percentage(breaks, blocks)
}

/// Descriptor for one in-use inode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: InodeId,
    pub name: String,
    pub size_kb: f64,
    pub size_bytes: u64,
    /// Direct blocks then indirect-table blocks, in slot order.
    pub block_ids: Vec<BlockId>,
    pub block_count: u32,
    pub is_fragmented: bool,
    pub uses_indirect: bool,
    pub indirect_block: Option<BlockId>,
    pub created_at: Option<Timestamp>,
}

impl FileInfo {
    /// Block ids as a comma separated list.
    #[must_use]
    pub fn block_list(&self) -> String {
        self.block_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Free,
    Occupied,
    Indirect,
}

/// Classification of one block slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockState {
    pub id: BlockId,
    pub kind: BlockKind,
    /// Owning file name, `"system"` for marked blocks without an owner.
    pub owner: Option<String>,
}

/// Owner reported for blocks that are marked used but referenced by no inode.
pub const SYSTEM_OWNER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub free_inodes: u32,
    pub used_inodes: u32,
    pub free_blocks: u32,
    pub used_blocks: u32,
    pub fragmentation: f64,
    pub active_files: u32,
}

/// Aggregates sampled by the stress driver at checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Sequence number of the latest history entry.
    pub operation: u64,
    pub active_files: u32,
    pub occupied_blocks: u32,
    pub fragmentation: f64,
    pub free_inodes: u32,
    pub free_blocks: u32,
    pub files_with_indirection: u32,
    pub files: Vec<FileInfo>,
    pub taken_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<BlockId> {
        raw.iter().copied().map(BlockId).collect()
    }

    #[test]
    fn breaks_in_sequences() {
        assert_eq!(count_breaks(&ids(&[])), 0);
        assert_eq!(count_breaks(&ids(&[7])), 0);
        assert_eq!(count_breaks(&ids(&[0, 1, 2, 3])), 0);
        assert_eq!(count_breaks(&ids(&[8, 9, 20])), 1);
        assert_eq!(count_breaks(&ids(&[3, 2, 1])), 2);
        assert!(!is_fragmented(&ids(&[42])));
        assert!(is_fragmented(&ids(&[24, 35, 36])));
    }

    #[test]
    fn fragmentation_ignores_single_block_files() {
        let a = ids(&[0]);
        let b = ids(&[5]);
        assert!(fragmentation_percent([a.as_slice(), b.as_slice()]).abs() < f64::EPSILON);
        assert!(fragmentation_percent(std::iter::empty::<&[BlockId]>()).abs() < f64::EPSILON);
    }

    #[test]
    fn fragmentation_ratio_over_participating_blocks() {
        let a = ids(&[0, 1, 2]);
        let b = ids(&[5, 9]);
        let single = ids(&[3]);
        // 1 break over 5 participating blocks.
        let pct = fragmentation_percent([a.as_slice(), b.as_slice(), single.as_slice()]);
        assert!((pct - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn block_list_formatting() {
        let info = FileInfo {
            id: InodeId(0),
            name: "a".into(),
            size_kb: 3.0,
            size_bytes: 3072,
            block_ids: ids(&[5, 6, 7]),
            block_count: 3,
            is_fragmented: false,
            uses_indirect: false,
            indirect_block: None,
            created_at: None,
        };
        assert_eq!(info.block_list(), "5, 6, 7");
    }
}
