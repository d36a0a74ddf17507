#![forbid(unsafe_code)]
//! Shared identifiers and geometry for the esim allocation simulator.
//!
//! The geometry is fixed: every engine instance has the same inode table,
//! block pool, and pointer layout. These values are part of the public
//! contract and are consumed by reports and front ends, so they live here
//! rather than inside the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Number of slots in the inode table.
pub const TOTAL_INODES: u32 = 32;
/// Number of slots in the block pool.
pub const TOTAL_BLOCKS: u32 = 128;
/// Size of one block in bytes.
pub const BLOCK_SIZE: u32 = 1024;
/// Direct block pointers held by every inode.
pub const DIRECT_POINTERS: usize = 12;
/// Block references held by one indirect pointer table.
pub const INDIRECT_POINTER_CAPACITY: usize = 256;
/// Largest file expressible with direct + single-indirect pointers, in blocks.
pub const MAX_FILE_BLOCKS: u64 = (DIRECT_POINTERS + INDIRECT_POINTER_CAPACITY) as u64;
/// Largest file expressible with direct + single-indirect pointers, in bytes.
pub const MAX_FILE_SIZE: u64 = MAX_FILE_BLOCKS * BLOCK_SIZE as u64;
/// Maximum file name length, counted in characters.
pub const MAX_NAME_LENGTH: usize = 32;

/// Index of a slot in the block pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether `next` directly follows this block on disk.
    #[must_use]
    pub fn is_followed_by(self, next: Self) -> bool {
        self.0.checked_add(1) == Some(next.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a slot in the inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InodeId(pub u32);

impl InodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this id addresses a slot of the fixed inode table.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 < TOTAL_INODES
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wall-clock instant in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const EPOCH: Self = Self(0);

    #[must_use]
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self(u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX))
    }

    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

/// Number of blocks needed to hold `size_bytes` (ceiling division).
#[must_use]
pub fn blocks_for_size(size_bytes: u64) -> u64 {
    size_bytes.div_ceil(u64::from(BLOCK_SIZE))
}

/// Round to two decimal places, the precision used by every report.
#[must_use]
pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Size in KiB rounded to two decimals.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub fn bytes_to_kib(size_bytes: u64) -> f64 {
    round_hundredths(size_bytes as f64 / f64::from(BLOCK_SIZE))
}

/// Percentage of `part` over `whole`, rounded to two decimals; 0 when `whole == 0`.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_hundredths(part as f64 / whole as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_constants() {
        assert_eq!(MAX_FILE_BLOCKS, 268);
        assert_eq!(MAX_FILE_SIZE, 274_432);
        assert_eq!(TOTAL_INODES, 32);
        assert_eq!(TOTAL_BLOCKS, 128);
    }

    #[test]
    fn blocks_for_size_rounds_up() {
        assert_eq!(blocks_for_size(0), 0);
        assert_eq!(blocks_for_size(1), 1);
        assert_eq!(blocks_for_size(1024), 1);
        assert_eq!(blocks_for_size(1025), 2);
        assert_eq!(blocks_for_size(12 * 1024), 12);
        assert_eq!(blocks_for_size(12 * 1024 + 1), 13);
        assert_eq!(blocks_for_size(269 * 1024), 269);
    }

    #[test]
    fn block_adjacency() {
        assert!(BlockId(4).is_followed_by(BlockId(5)));
        assert!(!BlockId(4).is_followed_by(BlockId(6)));
        assert!(!BlockId(5).is_followed_by(BlockId(4)));
        assert!(!BlockId(u32::MAX).is_followed_by(BlockId(0)));
    }

    #[test]
    fn inode_id_range() {
        assert!(InodeId(0).is_valid());
        assert!(InodeId(31).is_valid());
        assert!(!InodeId(32).is_valid());
    }

    #[test]
    fn kib_and_percentage_rounding() {
        assert!((bytes_to_kib(1536) - 1.5).abs() < f64::EPSILON);
        assert!((bytes_to_kib(1000) - 0.98).abs() < f64::EPSILON);
        assert!((percentage(2, 92) - 2.17).abs() < f64::EPSILON);
        assert!(percentage(5, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&(BlockId(7), InodeId(3))).unwrap();
        assert_eq!(json, "[7,3]");
        let back: (BlockId, InodeId) = serde_json::from_str(&json).unwrap();
        assert_eq!(back, (BlockId(7), InodeId(3)));
    }

    #[test]
    fn timestamp_display_has_millis() {
        assert_eq!(Timestamp(12_345).to_string(), "12.345");
        assert!(Timestamp::now() > Timestamp::EPOCH);
    }
}
