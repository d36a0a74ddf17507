#![forbid(unsafe_code)]
//! Error types for the esim allocation engine.
//!
//! # Error Taxonomy
//!
//! Every failure is a local validation or capacity failure. None of them is
//! fatal and none is retried: capacity errors describe real exhaustion of the
//! fixed inode table or block pool.
//!
//! `create_file` checks its preconditions in a fixed order and reports the
//! first one that fails:
//!
//! | Order | Variant | errno |
//! |-------|---------|-------|
//! | 1 | `EmptyName` | `EINVAL` |
//! | 2 | `NameTooLong` | `ENAMETOOLONG` |
//! | 3 | `DuplicateName` | `EEXIST` |
//! | 4 | `NoFreeInode` | `ENOSPC` |
//! | 5 | `EmptyFile` | `EINVAL` |
//! | 6 | `FileTooLarge` | `EFBIG` |
//! | 7 | `InsufficientBlocks` | `ENOSPC` |
//! | 8 | `NoFreeBlockForIndirection` | `ENOSPC` |
//!
//! `delete_file` reports `InvalidInodeId` (`EINVAL`) or `InodeNotInUse`
//! (`ENOENT`). Name lookups used by front ends report `NotFound` (`ENOENT`).
//!
//! ## errno Mapping
//!
//! [`EsimError::to_errno`] is exhaustive (no wildcard arms) so adding a variant
//! is a compile error until its errno is assigned.

use thiserror::Error;

/// Unified error type for all engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EsimError {
    /// The file name is the empty string.
    #[error("file name must not be empty")]
    EmptyName,

    /// The file name is longer than the table allows.
    #[error("file name is {len} characters, limit is {max}")]
    NameTooLong { len: usize, max: usize },

    /// An in-use inode already carries this name.
    #[error("a file named {0:?} already exists")]
    DuplicateName(String),

    /// Every inode slot is in use.
    #[error("no free inode available")]
    NoFreeInode,

    /// A zero-byte file would own an inode without blocks.
    #[error("file size must be greater than zero")]
    EmptyFile,

    /// The file needs more blocks than direct + single-indirect pointers address.
    #[error("file needs {blocks_needed} blocks, at most {max} are addressable")]
    FileTooLarge { blocks_needed: u64, max: u64 },

    /// The first-fit scan found fewer free blocks than required.
    #[error("not enough free blocks: need {needed}, found {available}")]
    InsufficientBlocks { needed: u64, available: u64 },

    /// Data blocks were found but no extra block is left for the indirect table.
    #[error("no free block left for the indirect pointer table")]
    NoFreeBlockForIndirection,

    /// The inode id is outside the fixed table.
    #[error("inode id {0} is out of range")]
    InvalidInodeId(u32),

    /// The addressed inode does not hold a file.
    #[error("inode {0} is not in use")]
    InodeNotInUse(u32),

    /// No in-use inode carries this name.
    #[error("no file named {0:?}")]
    NotFound(String),
}

impl EsimError {
    /// Convert this error into a POSIX errno, e.g. for a process exit status.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::EmptyName | Self::EmptyFile | Self::InvalidInodeId(_) => libc::EINVAL,
            Self::NameTooLong { .. } => libc::ENAMETOOLONG,
            Self::DuplicateName(_) => libc::EEXIST,
            Self::NoFreeInode
            | Self::InsufficientBlocks { .. }
            | Self::NoFreeBlockForIndirection => libc::ENOSPC,
            Self::FileTooLarge { .. } => libc::EFBIG,
            Self::InodeNotInUse(_) | Self::NotFound(_) => libc::ENOENT,
        }
    }

    /// Stable snake_case identifier used in logs and JSON reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::NameTooLong { .. } => "name_too_long",
            Self::DuplicateName(_) => "duplicate_name",
            Self::NoFreeInode => "no_free_inode",
            Self::EmptyFile => "empty_file",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::InsufficientBlocks { .. } => "insufficient_blocks",
            Self::NoFreeBlockForIndirection => "no_free_block_for_indirection",
            Self::InvalidInodeId(_) => "invalid_inode_id",
            Self::InodeNotInUse(_) => "inode_not_in_use",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Whether the failure reflects exhausted capacity rather than bad input.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            Self::NoFreeInode | Self::InsufficientBlocks { .. } | Self::NoFreeBlockForIndirection
        )
    }
}

/// Result alias using `EsimError`.
pub type Result<T> = std::result::Result<T, EsimError>;
