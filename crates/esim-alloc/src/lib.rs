#![forbid(unsafe_code)]
//! Bitmap-backed resource tracking with linear first-fit search.
//!
//! ## Design
//!
//! The allocator is layered:
//!
//! 1. **Bitmap ops**: raw bit manipulation on packed byte slices.
//! 2. **Scans**: first-fit searches that always start at index 0 and walk
//!    upward, so the lowest free index wins.
//! 3. **[`Bitmap`]**: an owned, fixed-length bitmap used for both the inode
//!    table and the block pool.
//!
//! Scans are O(n) over the bitmap and keep no acceleration index.

use tracing::trace;

// ── Bitmap operations ───────────────────────────────────────────────────────

/// Get bit `idx` from a bitmap byte slice.
#[must_use]
pub fn bitmap_get(bitmap: &[u8], idx: u32) -> bool {
    let byte_idx = (idx / 8) as usize;
    let bit_idx = idx % 8;
    if byte_idx >= bitmap.len() {
        return false;
    }
    (bitmap[byte_idx] >> bit_idx) & 1 == 1
}

/// Set bit `idx` in a bitmap byte slice.
pub fn bitmap_set(bitmap: &mut [u8], idx: u32) {
    let byte_idx = (idx / 8) as usize;
    let bit_idx = idx % 8;
    if byte_idx < bitmap.len() {
        bitmap[byte_idx] |= 1 << bit_idx;
    }
}

/// Clear bit `idx` in a bitmap byte slice.
pub fn bitmap_clear(bitmap: &mut [u8], idx: u32) {
    let byte_idx = (idx / 8) as usize;
    let bit_idx = idx % 8;
    if byte_idx < bitmap.len() {
        bitmap[byte_idx] &= !(1 << bit_idx);
    }
}

/// Count free (zero) bits in the first `count` bits of `bitmap`.
#[must_use]
pub fn bitmap_count_free(bitmap: &[u8], count: u32) -> u32 {
    let full_bytes = (count / 8) as usize;
    let remainder = count % 8;
    let mut free = 0u32;

    for &byte in bitmap.iter().take(full_bytes) {
        free += byte.count_zeros();
    }

    if remainder > 0 && full_bytes < bitmap.len() {
        let byte = bitmap[full_bytes];
        for bit in 0..remainder {
            if (byte >> bit) & 1 == 0 {
                free += 1;
            }
        }
    }

    free
}

// ── First-fit scans ─────────────────────────────────────────────────────────

/// Find the lowest free bit in the first `count` bits of `bitmap`.
///
/// Unlike a goal-directed search this never wraps: the scan starts at 0.
#[must_use]
pub fn bitmap_first_free(bitmap: &[u8], count: u32) -> Option<u32> {
    (0..count).find(|&idx| !bitmap_get(bitmap, idx))
}

/// Collect up to `want` free bits in increasing index order.
///
/// Indices for which `skip` returns true are treated as taken even when their
/// bit is clear. The returned vector is shorter than `want` when the bitmap
/// runs out of free bits.
#[must_use]
pub fn bitmap_collect_free(
    bitmap: &[u8],
    count: u32,
    want: usize,
    skip: impl Fn(u32) -> bool,
) -> Vec<u32> {
    let mut found = Vec::with_capacity(want);
    for idx in 0..count {
        if found.len() >= want {
            break;
        }
        if !bitmap_get(bitmap, idx) && !skip(idx) {
            found.push(idx);
        }
    }
    trace!(want, found = found.len(), "first-fit scan");
    found
}

// ── Owned bitmap ────────────────────────────────────────────────────────────

/// Fixed-length occupancy bitmap. A set bit means "in use".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
    len: u32,
}

impl Bitmap {
    /// Create an all-free bitmap tracking `len` resources.
    #[must_use]
    pub fn new(len: u32) -> Self {
        Self {
            bits: vec![0; len.div_ceil(8) as usize],
            len,
        }
    }

    /// Number of tracked resources.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether resource `idx` is in use. Out-of-range indices read as free.
    #[must_use]
    pub fn is_set(&self, idx: u32) -> bool {
        idx < self.len && bitmap_get(&self.bits, idx)
    }

    /// Mark resource `idx` in use. Out-of-range indices are ignored.
    pub fn set(&mut self, idx: u32) {
        if idx < self.len {
            bitmap_set(&mut self.bits, idx);
        }
    }

    /// Mark resource `idx` free. Out-of-range indices are ignored.
    pub fn clear(&mut self, idx: u32) {
        if idx < self.len {
            bitmap_clear(&mut self.bits, idx);
        }
    }

    /// Mark every resource free.
    pub fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    #[must_use]
    pub fn count_free(&self) -> u32 {
        bitmap_count_free(&self.bits, self.len)
    }

    #[must_use]
    pub fn count_set(&self) -> u32 {
        self.len - self.count_free()
    }

    /// Lowest free index, if any.
    #[must_use]
    pub fn first_free(&self) -> Option<u32> {
        bitmap_first_free(&self.bits, self.len)
    }

    /// Up to `want` lowest free indices, in increasing order.
    #[must_use]
    pub fn collect_free(&self, want: usize) -> Vec<u32> {
        bitmap_collect_free(&self.bits, self.len, want, |_| false)
    }

    /// Lowest free index that is not in `claimed`.
    #[must_use]
    pub fn first_free_excluding(&self, claimed: &[u32]) -> Option<u32> {
        bitmap_collect_free(&self.bits, self.len, 1, |idx| claimed.contains(&idx))
            .first()
            .copied()
    }

    /// Iterate over the indices of in-use resources.
    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).filter(|&idx| bitmap_get(&self.bits, idx))
    }

    /// Raw packed bytes, least significant bit first.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}
