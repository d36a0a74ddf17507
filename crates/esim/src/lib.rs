#![forbid(unsafe_code)]
//! esim public API facade.
//!
//! Re-exports the engine from `esim-core` together with the identifier and
//! error types its signatures use. Front ends (CLI, stress harness) depend on
//! this crate only.

pub use esim_core::*;
pub use esim_error::{EsimError, Result};
pub use esim_types::{
    BLOCK_SIZE, BlockId, DIRECT_POINTERS, INDIRECT_POINTER_CAPACITY, InodeId, MAX_FILE_BLOCKS,
    MAX_FILE_SIZE, MAX_NAME_LENGTH, TOTAL_BLOCKS, TOTAL_INODES, Timestamp, blocks_for_size,
};
