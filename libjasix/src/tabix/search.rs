use std::io::{Read, Seek};

use super::{Chunk, ReferenceSequence, TabixIndex};
use crate::{
    bgzf::BgzfReader,
    bins::{
        bin_for, bottom_linear_index, overlapping_bins, parent_bin, LEAF_BIN_OFFSET, MAX_BIN, MAX_POSITION,
        MIN_SHIFT,
    },
    error::Result,
    virtual_position::VirtualPosition,
};

/// 1-based position to the 0-based coordinate the bins use
pub fn adjust_begin(position: i32) -> u64
{
    (position as i64 - 1).clamp(0, MAX_POSITION as i64 - 1) as u64
}

/// Lower bound on the virtual offset of records at or after `begin`.
///
/// Walks left over siblings, and up whenever the first child is reached,
/// until an indexed bin is found; the linear index entry where that bin
/// begins is the bound.
pub fn min_offset(reference: &ReferenceSequence, begin: u64) -> u64
{
    let mut bin = bin_for(begin.min(MAX_POSITION - 1));
    while bin > 0 && !reference.has_bin(bin) {
        let first_sibling = (parent_bin(bin) << 3) + 1;
        if bin > first_sibling {
            bin -= 1;
        } else {
            bin = parent_bin(bin);
        }
    }

    let linear = reference.linear_index();
    let window = bottom_linear_index(bin);
    match linear.get(window) {
        Some(offset) => *offset,
        None => linear.last().copied().unwrap_or(0),
    }
}

/// Upper bound on the virtual offset of records before `end`: the first
/// chunk of the next indexed bin to the right. `u64::MAX` when there is none.
pub fn max_offset(reference: &ReferenceSequence, end: u64) -> u64
{
    let end = end.clamp(1, MAX_POSITION);
    let mut bin = bin_for(end - 1) + 1;
    if bin >= MAX_BIN {
        bin = 0;
    }

    loop {
        // First children have no left neighbor at this level
        while bin % 8 == 1 {
            bin = parent_bin(bin);
        }
        if bin == 0 {
            return u64::MAX;
        }
        if let Some(chunks) = reference.chunks(bin) {
            return chunks[0].begin.value();
        }
        bin += 1;
    }
}

/// Smallest chunk begin, clamped up to `min`, among chunks that intersect
/// `(min, max)`
pub fn min_overlap_offset(chunks: &[Chunk], min: u64, max: u64) -> Option<u64>
{
    chunks
        .iter()
        .filter(|c| c.end.value() > min && c.begin.value() < max)
        .map(|c| c.begin.value().max(min))
        .min()
}

/// The smallest begin and largest end over `chunks`
pub fn min_max_virtual_offset(chunks: &[Chunk]) -> Option<(VirtualPosition, VirtualPosition)>
{
    let begin = chunks.iter().map(|c| c.begin).min()?;
    let end = chunks.iter().map(|c| c.end).max()?;
    Some((begin, end))
}

impl TabixIndex
{
    /// Virtual offset to start reading at for records of `chromosome` at
    /// 1-based `position`
    pub fn offset_for(&self, chromosome: &str, position: i32) -> Option<u64>
    {
        let reference = self.reference_sequence(chromosome)?;
        let begin = adjust_begin(position);
        let bin = bin_for(begin);

        let Some(chunks) = reference.chunks(bin) else {
            let window = (begin >> MIN_SHIFT) as usize;
            return reference.linear_index().get(window).copied();
        };

        let min = min_offset(reference, begin);
        let max = max_offset(reference, begin + 1);
        Some(min_overlap_offset(chunks, min, max).unwrap_or(min))
    }

    /// Merged chunks that may hold records overlapping `[begin, end]`,
    /// 1-based, in file order
    pub fn chunks_for(&self, chromosome: &str, begin: i32, end: i32) -> Vec<Chunk>
    {
        let Some(reference) = self.reference_sequence(chromosome) else {
            return Vec::new();
        };

        let begin = adjust_begin(begin);
        let end = (end.max(0) as u64).max(begin + 1);

        let linear = reference.linear_index();
        let min_offset = linear
            .get((begin >> MIN_SHIFT) as usize)
            .or(linear.last())
            .copied()
            .unwrap_or(0);

        let mut chunks: Vec<Chunk> = overlapping_bins(begin, end, |bin| reference.has_bin(bin))
            .into_iter()
            .filter_map(|bin| reference.chunks(bin))
            .flatten()
            .filter(|c| c.end.value() > min_offset)
            .copied()
            .collect();
        chunks.sort_unstable();

        let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match merged.last_mut() {
                Some(last) if chunk.begin <= last.end => last.end = last.end.max(chunk.end),
                _ => merged.push(chunk),
            }
        }
        merged
    }

    /// Whether any record of `chromosome` starts within `[begin, end]`,
    /// 1-based and closed.
    ///
    /// Internal leaf bins that hold data answer without touching the
    /// file. The bins at either edge are scanned, then the coarser bins
    /// over the range, which hold records crossing a leaf window boundary.
    pub fn has_variants<R: Read + Seek>(
        &self,
        reader: &mut BgzfReader<R>,
        chromosome: &str,
        begin: i32,
        end: i32,
    ) -> Result<bool>
    {
        let Some(index) = self.reference_index(chromosome) else {
            return Ok(false);
        };
        let reference = &self.references()[index];

        let begin_bin = bin_for(adjust_begin(begin));
        let end_bin = bin_for(adjust_begin(end));

        if (begin_bin + 1..end_bin).any(|bin| reference.has_bin(bin)) {
            return Ok(true);
        }

        let names = self.names_for(index);
        let mut edges = vec![begin_bin];
        if end_bin != begin_bin {
            edges.push(end_bin);
        }

        for bin in edges {
            if let Some(chunks) = reference.chunks(bin) {
                if self.scan_chunks(reader, &names, chunks, begin, end)? {
                    return Ok(true);
                }
            }
        }

        let first = adjust_begin(begin);
        let linear = reference.linear_index();
        let min_offset = linear
            .get((first >> MIN_SHIFT) as usize)
            .or(linear.last())
            .copied()
            .unwrap_or(0);

        let ancestors: Vec<Chunk> =
            overlapping_bins(first, adjust_begin(end) + 1, |bin| bin < LEAF_BIN_OFFSET && reference.has_bin(bin))
                .into_iter()
                .filter_map(|bin| reference.chunks(bin))
                .flatten()
                .filter(|c| c.end.value() > min_offset)
                .copied()
                .collect();
        self.scan_chunks(reader, &names, &ancestors, begin, end)
    }

    fn scan_chunks<R: Read + Seek>(
        &self,
        reader: &mut BgzfReader<R>,
        names: &[&str],
        chunks: &[Chunk],
        begin: i32,
        end: i32,
    ) -> Result<bool>
    {
        let Some((min_begin, max_end)) = min_max_virtual_offset(chunks) else {
            return Ok(false);
        };

        reader.seek(min_begin)?;
        let mut line = String::new();
        while reader.virtual_position() < max_end {
            if reader.read_line_at(&mut line)?.is_none() {
                break;
            }
            if line.as_bytes().first() == Some(&self.comment_char) {
                continue;
            }

            let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
            let (Some(name), Some(position)) = (fields.get(self.sequence_column), fields.get(self.begin_column))
            else {
                continue;
            };
            if !names.contains(name) {
                continue;
            }
            let Ok(mut position) = position.parse::<i32>() else {
                log::warn!("Skipping record with bad position: {}", position);
                continue;
            };
            if self.is_zero_based() {
                position += 1;
            }

            if position > end {
                return Ok(false);
            }
            if position >= begin {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
