use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

use super::{FORMAT_VCF, FORMAT_ZERO_BASED, TABIX_MAGIC};
use crate::{
    bgzf::{is_bgzf, BgzfReader, BgzfWriter},
    error::{Error, Result},
    utils::alternate_chromosome_name,
    virtual_position::VirtualPosition,
};

/// Virtual offset range `[begin, end)` holding records of one bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk
{
    pub begin: VirtualPosition,
    pub end: VirtualPosition,
}

impl Chunk
{
    pub const fn new(begin: u64, end: u64) -> Self
    {
        Chunk {
            begin: VirtualPosition::new(begin),
            end: VirtualPosition::new(end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceSequence
{
    pub name: String,
    bins: BTreeMap<u32, Vec<Chunk>>,
    linear_index: Vec<u64>,
}

impl ReferenceSequence
{
    pub fn new<S: Into<String>>(name: S, bins: BTreeMap<u32, Vec<Chunk>>, linear_index: Vec<u64>) -> Self
    {
        ReferenceSequence {
            name: name.into(),
            bins,
            linear_index,
        }
    }

    /// Chunks of `bin`, `None` if the bin is absent or empty
    pub fn chunks(&self, bin: u32) -> Option<&[Chunk]>
    {
        self.bins
            .get(&bin)
            .map(|chunks| chunks.as_slice())
            .filter(|chunks| !chunks.is_empty())
    }

    pub fn has_bin(&self, bin: u32) -> bool
    {
        self.chunks(bin).is_some()
    }

    pub fn bins(&self) -> impl Iterator<Item = (u32, &[Chunk])>
    {
        self.bins.iter().map(|(bin, chunks)| (*bin, chunks.as_slice()))
    }

    pub fn linear_index(&self) -> &[u64]
    {
        &self.linear_index
    }

    /// First window of the linear index that holds data
    pub fn first_data_offset(&self) -> Option<u64>
    {
        self.linear_index.iter().copied().find(|offset| *offset != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabixIndex
{
    pub format: i32,
    /// 0-based column holding the sequence name
    pub sequence_column: usize,
    /// 0-based column holding the start position
    pub begin_column: usize,
    /// 0-based column holding the end position, if the format has one
    pub end_column: Option<usize>,
    pub comment_char: u8,
    pub skip_lines: i32,
    references: Vec<ReferenceSequence>,
    name_to_index: HashMap<String, usize>,
}

impl Default for TabixIndex
{
    fn default() -> Self
    {
        TabixIndex::new(Vec::new())
    }
}

fn read_i32<R: Read>(mut in_buf: &mut R) -> Result<i32>
{
    let bincode_config = bincode::config::standard().with_fixed_int_encoding();
    Ok(bincode::decode_from_std_read(&mut in_buf, bincode_config)?)
}

fn read_u64<R: Read>(mut in_buf: &mut R) -> Result<u64>
{
    let bincode_config = bincode::config::standard().with_fixed_int_encoding();
    Ok(bincode::decode_from_std_read(&mut in_buf, bincode_config)?)
}

fn read_count<R: Read>(in_buf: &mut R, what: &str) -> Result<usize>
{
    let count = read_i32(in_buf)?;
    usize::try_from(count).map_err(|_| Error::format(format!("negative {} count: {}", what, count)))
}

fn write_i32<W: Write>(mut out_buf: &mut W, value: i32) -> Result<()>
{
    let bincode_config = bincode::config::standard().with_fixed_int_encoding();
    bincode::encode_into_std_write(value, &mut out_buf, bincode_config)?;
    Ok(())
}

fn write_u64<W: Write>(mut out_buf: &mut W, value: u64) -> Result<()>
{
    let bincode_config = bincode::config::standard().with_fixed_int_encoding();
    bincode::encode_into_std_write(value, &mut out_buf, bincode_config)?;
    Ok(())
}

/// Caps preallocation for counts read from untrusted input
const MAX_PREALLOCATE: usize = 1 << 16;

fn read_reference<R: Read>(in_buf: &mut R, name: String) -> Result<ReferenceSequence>
{
    let bin_count = read_count(in_buf, "bin")?;
    let mut bins = BTreeMap::new();
    for _ in 0..bin_count {
        let bin = read_i32(in_buf)?;
        let bin = u32::try_from(bin).map_err(|_| Error::format(format!("negative bin id: {}", bin)))?;
        let chunk_count = read_count(in_buf, "chunk")?;
        let mut chunks = Vec::with_capacity(chunk_count.min(MAX_PREALLOCATE));
        for _ in 0..chunk_count {
            let begin = read_u64(in_buf)?;
            let end = read_u64(in_buf)?;
            chunks.push(Chunk::new(begin, end));
        }
        bins.insert(bin, chunks);
    }

    let linear_count = read_count(in_buf, "linear index")?;
    let mut linear_index = Vec::with_capacity(linear_count.min(MAX_PREALLOCATE));
    for _ in 0..linear_count {
        linear_index.push(read_u64(in_buf)?);
    }

    Ok(ReferenceSequence::new(name, bins, linear_index))
}

impl TabixIndex
{
    /// A VCF style index over `references`
    pub fn new(references: Vec<ReferenceSequence>) -> Self
    {
        let name_to_index = references
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();

        TabixIndex {
            format: FORMAT_VCF,
            sequence_column: 0,
            begin_column: 1,
            end_column: None,
            comment_char: b'#',
            skip_lines: 0,
            references,
            name_to_index,
        }
    }

    /// Parses an uncompressed index
    pub fn read<R: Read>(mut in_buf: R) -> Result<Self>
    {
        let in_buf = &mut in_buf;

        let mut magic = [0u8; 4];
        in_buf.read_exact(&mut magic)?;
        if magic != TABIX_MAGIC {
            return Err(Error::format(format!("invalid tabix magic: {:02x?}", magic)));
        }

        let reference_count = read_count(in_buf, "reference")?;
        let format = read_i32(in_buf)?;
        let sequence_column = read_i32(in_buf)?;
        let begin_column = read_i32(in_buf)?;
        let end_column = read_i32(in_buf)?;
        let comment_char = read_i32(in_buf)?;
        let skip_lines = read_i32(in_buf)?;

        let to_zero_based = |column: i32, what: &str| {
            usize::try_from(column - 1)
                .map_err(|_| Error::format(format!("invalid {} column: {}", what, column)))
        };
        let sequence_column = to_zero_based(sequence_column, "sequence")?;
        let begin_column = to_zero_based(begin_column, "begin")?;
        let end_column = if end_column > 0 {
            Some(to_zero_based(end_column, "end")?)
        } else {
            None
        };

        let names_len = read_count(in_buf, "name block")?;
        let mut names_block = Vec::with_capacity(names_len.min(MAX_PREALLOCATE));
        (&mut *in_buf).take(names_len as u64).read_to_end(&mut names_block)?;
        if names_block.len() != names_len {
            return Err(Error::format("truncated tabix sequence names"));
        }

        let names: Vec<String> = names_block
            .split(|b| *b == 0)
            .filter(|name| !name.is_empty())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();

        if names.len() != reference_count {
            return Err(Error::format(format!(
                "tabix index lists {} references but names {}",
                reference_count,
                names.len()
            )));
        }

        let mut references = Vec::with_capacity(reference_count);
        for name in names {
            references.push(read_reference(in_buf, name)?);
        }

        log::debug!("Read tabix index with {} references", references.len());

        let mut index = TabixIndex::new(references);
        index.format = format;
        index.sequence_column = sequence_column;
        index.begin_column = begin_column;
        index.end_column = end_column;
        index.comment_char = comment_char as u8;
        index.skip_lines = skip_lines;
        Ok(index)
    }

    /// Parses a BGZF compressed index, the usual `.tbi` file
    pub fn from_bgzf<R: Read>(in_buf: R) -> Result<Self>
    {
        TabixIndex::read(BgzfReader::new(in_buf))
    }

    /// Opens a `.tbi` file, compressed or not
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self>
    {
        let mut bytes = Vec::new();
        BufReader::new(File::open(path.as_ref())?).read_to_end(&mut bytes)?;
        if is_bgzf(&bytes) {
            TabixIndex::from_bgzf(&bytes[..])
        } else {
            TabixIndex::read(&bytes[..])
        }
    }

    /// Serializes in the upstream layout, bins in ascending order
    pub fn write<W: Write>(&self, mut out_buf: W) -> Result<()>
    {
        let out_buf = &mut out_buf;
        out_buf.write_all(&TABIX_MAGIC)?;
        write_i32(out_buf, self.references.len() as i32)?;
        write_i32(out_buf, self.format)?;
        write_i32(out_buf, self.sequence_column as i32 + 1)?;
        write_i32(out_buf, self.begin_column as i32 + 1)?;
        write_i32(out_buf, self.end_column.map(|c| c as i32 + 1).unwrap_or(0))?;
        write_i32(out_buf, self.comment_char as i32)?;
        write_i32(out_buf, self.skip_lines)?;

        let mut names = Vec::new();
        for reference in &self.references {
            names.extend_from_slice(reference.name.as_bytes());
            names.push(0);
        }
        write_i32(out_buf, names.len() as i32)?;
        out_buf.write_all(&names)?;

        for reference in &self.references {
            write_i32(out_buf, reference.bins.len() as i32)?;
            for (bin, chunks) in &reference.bins {
                write_i32(out_buf, *bin as i32)?;
                write_i32(out_buf, chunks.len() as i32)?;
                for chunk in chunks {
                    write_u64(out_buf, chunk.begin.value())?;
                    write_u64(out_buf, chunk.end.value())?;
                }
            }
            write_i32(out_buf, reference.linear_index.len() as i32)?;
            for offset in &reference.linear_index {
                write_u64(out_buf, *offset)?;
            }
        }
        Ok(())
    }

    pub fn write_bgzf<W: Write>(&self, out_buf: W) -> Result<W>
    {
        let mut writer = BgzfWriter::new(out_buf);
        self.write(&mut writer)?;
        writer.finish()
    }

    pub fn references(&self) -> &[ReferenceSequence]
    {
        &self.references
    }

    /// Positions in the indexed file are 0-based
    pub fn is_zero_based(&self) -> bool
    {
        self.format & FORMAT_ZERO_BASED != 0
    }

    pub fn reference_index(&self, name: &str) -> Option<usize>
    {
        self.name_to_index.get(name).copied()
    }

    pub fn reference_sequence(&self, name: &str) -> Option<&ReferenceSequence>
    {
        self.reference_index(name).map(|i| &self.references[i])
    }

    /// Makes `alias` resolve to the same reference as `name`
    pub fn add_alias(&mut self, alias: &str, name: &str) -> Result<()>
    {
        let index = self
            .reference_index(name)
            .ok_or_else(|| Error::input(format!("unknown tabix reference: {}", name)))?;
        self.name_to_index.insert(alias.to_string(), index);
        Ok(())
    }

    /// Registers `chr1` for `1` and `1` for `chr1`, as well as `chrM` and
    /// `MT`, for every reference
    pub fn add_chr_prefix_aliases(&mut self)
    {
        for (i, reference) in self.references.iter().enumerate() {
            let alias = alternate_chromosome_name(&reference.name);
            self.name_to_index.entry(alias).or_insert(i);
        }
    }

    /// Every name, canonical or alias, that resolves to reference `index`
    pub fn names_for(&self, index: usize) -> Vec<&str>
    {
        self.name_to_index
            .iter()
            .filter(|(_, i)| **i == index)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
