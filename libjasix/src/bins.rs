//! Hierarchical binning shared by the tabix reader and search.
//!
//! Six levels partition [0, 2^29). Level 0 is a single bin covering the
//! whole range, every following level splits its parent window into 8 and
//! level 5 holds the 16 Kbp leaf windows.

/// log2 of the leaf window (16 Kbp)
pub const MIN_SHIFT: u32 = 14;

/// Index of the deepest level, there are `DEPTH + 1` levels
pub const DEPTH: u32 = 5;

/// First bin id of the leaf level
pub const LEAF_BIN_OFFSET: u32 = first_bin_of_level(DEPTH);

/// One past the last valid bin id
pub const MAX_BIN: u32 = first_bin_of_level(DEPTH + 1);

/// Largest position representable by the scheme (exclusive)
pub const MAX_POSITION: u64 = 1 << (MIN_SHIFT + 3 * DEPTH);

pub const fn first_bin_of_level(level: u32) -> u32
{
    ((1 << (3 * level)) - 1) / 7
}

/// Leaf bin of a 0-based position
pub const fn bin_for(pos: u64) -> u32
{
    LEAF_BIN_OFFSET + (pos >> MIN_SHIFT) as u32
}

/// Parent of `bin`. The root is its own parent.
pub const fn parent_bin(bin: u32) -> u32
{
    if bin == 0 {
        0
    } else {
        (bin - 1) >> 3
    }
}

pub const fn level_of(bin: u32) -> u32
{
    let mut level = 0;
    while level < DEPTH && bin >= first_bin_of_level(level + 1) {
        level += 1;
    }
    level
}

/// Linear index window where `bin` begins
pub const fn bottom_linear_index(bin: u32) -> usize
{
    let level = level_of(bin);
    ((bin - first_bin_of_level(level)) << (3 * (DEPTH - level))) as usize
}

/// Bin ids, on every level, that may hold records overlapping the 0-based
/// half-open range [begin, end). Only ids for which `present` returns true
/// are yielded, in ascending order.
pub fn overlapping_bins<F>(begin: u64, end: u64, present: F) -> Vec<u32>
where
    F: Fn(u32) -> bool,
{
    let begin = begin.min(MAX_POSITION - 1);
    let end = end.clamp(begin + 1, MAX_POSITION) - 1;

    let mut bins = Vec::new();
    for level in 0..=DEPTH {
        let first = first_bin_of_level(level) as u64;
        let shift = MIN_SHIFT + 3 * (DEPTH - level);
        let lo = first + (begin >> shift);
        let hi = first + (end >> shift);
        bins.extend((lo..=hi).map(|b| b as u32).filter(|b| present(*b)));
    }
    bins
}
