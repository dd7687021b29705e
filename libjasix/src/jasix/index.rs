use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use super::{
    chr_index::{ChrIndexBuilder, JasixChrIndex},
    VERSION,
};
use crate::{
    block_stream::{BlockReader, BlockWriter, BLOCK_MAGIC},
    error::{Error, Result},
    parameters::Parameters,
};

const MAX_PREALLOCATE: usize = 1 << 16;

/// File range of a named section of the indexed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRange
{
    pub begin: u64,
    /// `None` until the section is closed
    pub end: Option<u64>,
}

/// Accumulates records during the single sorted pass over the output
#[derive(Debug, Clone)]
pub struct JasixIndexBuilder
{
    parameters: Parameters,
    header: String,
    chromosomes: Vec<ChrIndexBuilder>,
    chromosome_lookup: HashMap<String, usize>,
    synonyms: BTreeMap<String, String>,
    sections: BTreeMap<String, FileRange>,
}

impl Default for JasixIndexBuilder
{
    fn default() -> Self
    {
        JasixIndexBuilder::new(Parameters::default())
    }
}

impl JasixIndexBuilder
{
    pub fn new(parameters: Parameters) -> Self
    {
        JasixIndexBuilder {
            parameters,
            header: String::new(),
            chromosomes: Vec::new(),
            chromosome_lookup: HashMap::new(),
            synonyms: BTreeMap::new(),
            sections: BTreeMap::new(),
        }
    }

    pub fn parameters(&self) -> &Parameters
    {
        &self.parameters
    }

    pub fn set_header<S: Into<String>>(&mut self, header: S)
    {
        self.header = header.into();
    }

    pub fn add(&mut self, chromosome: &str, start: i32, end: i32, file_location: u64) -> Result<()>
    {
        let i = match self.chromosome_lookup.get(chromosome) {
            Some(i) => *i,
            None => {
                log::debug!("Starting chromosome {}", chromosome);
                self.chromosomes
                    .push(ChrIndexBuilder::new(chromosome, &self.parameters));
                self.chromosome_lookup
                    .insert(chromosome.to_string(), self.chromosomes.len() - 1);
                self.chromosomes.len() - 1
            }
        };
        self.chromosomes[i].add(start, end, file_location)
    }

    /// As `add`, and makes `synonym` resolve to `chromosome`
    pub fn add_with_synonym(
        &mut self,
        chromosome: &str,
        start: i32,
        end: i32,
        file_location: u64,
        synonym: &str,
    ) -> Result<()>
    {
        if !synonym.is_empty() {
            self.synonyms
                .insert(synonym.to_string(), chromosome.to_string());
        }
        self.add(chromosome, start, end, file_location)
    }

    pub fn begin_section(&mut self, name: &str, file_location: u64) -> Result<()>
    {
        if self.sections.contains_key(name) {
            return Err(Error::input(format!("section {} begins more than once", name)));
        }
        log::info!("Section {} begins at {}", name, file_location);
        self.sections.insert(
            name.to_string(),
            FileRange {
                begin: file_location,
                end: None,
            },
        );
        Ok(())
    }

    /// Closing a section that never began is ignored
    pub fn end_section(&mut self, name: &str, file_location: u64) -> Result<()>
    {
        let Some(range) = self.sections.get_mut(name) else {
            log::warn!("Ignoring end of section {} which never began", name);
            return Ok(());
        };
        if range.end.is_some() {
            return Err(Error::input(format!("section {} ends more than once", name)));
        }
        log::info!("Section {} ends at {}", name, file_location);
        range.end = Some(file_location);
        Ok(())
    }

    /// Closes every open node and compiles the large variants
    pub fn flush(self) -> JasixIndex
    {
        let chromosomes: Vec<JasixChrIndex> = self
            .chromosomes
            .into_iter()
            .map(ChrIndexBuilder::finish)
            .collect();
        JasixIndex::from_parts(self.header, chromosomes, self.synonyms, self.sections)
    }
}

/// Immutable, queryable index
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JasixIndex
{
    header: String,
    chromosomes: Vec<JasixChrIndex>,
    chromosome_lookup: HashMap<String, usize>,
    synonyms: BTreeMap<String, String>,
    sections: BTreeMap<String, FileRange>,
}

impl JasixIndex
{
    fn from_parts(
        header: String,
        chromosomes: Vec<JasixChrIndex>,
        synonyms: BTreeMap<String, String>,
        sections: BTreeMap<String, FileRange>,
    ) -> Self
    {
        let chromosome_lookup = chromosomes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name().to_string(), i))
            .collect();
        JasixIndex {
            header,
            chromosomes,
            chromosome_lookup,
            synonyms,
            sections,
        }
    }

    pub fn header(&self) -> &str
    {
        &self.header
    }

    /// Chromosome names in the order they appear in the indexed file
    pub fn chromosomes(&self) -> impl Iterator<Item = &str>
    {
        self.chromosomes.iter().map(|c| c.name())
    }

    /// Resolves a native name or a synonym to the indexed name
    pub fn canonical_name(&self, chromosome: &str) -> Option<&str>
    {
        if let Some(i) = self.chromosome_lookup.get(chromosome) {
            return Some(self.chromosomes[*i].name());
        }
        let name = self.synonyms.get(chromosome)?;
        self.chromosome_lookup
            .get(name)
            .map(|i| self.chromosomes[*i].name())
    }

    pub fn contains_chromosome(&self, chromosome: &str) -> bool
    {
        self.canonical_name(chromosome).is_some()
    }

    pub fn chr_index(&self, chromosome: &str) -> Option<&JasixChrIndex>
    {
        let name = self.canonical_name(chromosome)?;
        self.chromosome_lookup
            .get(name)
            .map(|i| &self.chromosomes[*i])
    }

    /// File location to start scanning from for records overlapping
    /// `[start, end]`
    pub fn first_variant_offset(&self, chromosome: &str, start: i32, end: i32) -> Option<u64>
    {
        self.chr_index(chromosome)?.first_small_variant(start, end)
    }

    /// File locations of all large variants overlapping `[begin, end]`
    pub fn large_variant_offsets(&self, chromosome: &str, begin: i32, end: i32) -> Vec<u64>
    {
        self.chr_index(chromosome)
            .map(|c| c.large_variants(begin, end))
            .unwrap_or_default()
    }

    pub fn section(&self, name: &str) -> Option<FileRange>
    {
        self.sections.get(name).copied()
    }

    pub fn section_begin(&self, name: &str) -> Option<u64>
    {
        self.section(name).map(|r| r.begin)
    }

    pub fn section_end(&self, name: &str) -> Option<u64>
    {
        self.section(name).and_then(|r| r.end)
    }

    pub fn write<W: Write>(&self, mut out_buf: W) -> Result<()>
    {
        let bincode_config = bincode::config::standard();
        let out_buf = &mut out_buf;

        bincode::encode_into_std_write(VERSION, out_buf, bincode_config)?;
        bincode::encode_into_std_write(&self.header, out_buf, bincode_config)?;

        bincode::encode_into_std_write(self.chromosomes.len() as u64, out_buf, bincode_config)?;
        for chromosome in &self.chromosomes {
            chromosome.encode(out_buf)?;
        }

        bincode::encode_into_std_write(self.synonyms.len() as u64, out_buf, bincode_config)?;
        for (synonym, name) in &self.synonyms {
            bincode::encode_into_std_write(synonym, out_buf, bincode_config)?;
            bincode::encode_into_std_write(name, out_buf, bincode_config)?;
        }

        bincode::encode_into_std_write(self.sections.len() as u64, out_buf, bincode_config)?;
        for (name, range) in &self.sections {
            bincode::encode_into_std_write(name, out_buf, bincode_config)?;
            bincode::encode_into_std_write(range.begin, out_buf, bincode_config)?;
            bincode::encode_into_std_write(range.end.unwrap_or(u64::MAX), out_buf, bincode_config)?;
        }
        out_buf.flush()?;
        Ok(())
    }

    pub fn read<R: Read>(mut in_buf: R) -> Result<Self>
    {
        let bincode_config = bincode::config::standard();
        let in_buf = &mut in_buf;

        let version: i32 = bincode::decode_from_std_read(in_buf, bincode_config)?;
        if version != VERSION {
            return Err(Error::format(format!(
                "invalid jasix version: observed {}, expected {}",
                version, VERSION
            )));
        }
        let header: String = bincode::decode_from_std_read(in_buf, bincode_config)?;

        let count: u64 = bincode::decode_from_std_read(in_buf, bincode_config)?;
        let mut chromosomes = Vec::with_capacity((count as usize).min(MAX_PREALLOCATE));
        for _ in 0..count {
            chromosomes.push(JasixChrIndex::decode(in_buf)?);
        }

        let count: u64 = bincode::decode_from_std_read(in_buf, bincode_config)?;
        let mut synonyms = BTreeMap::new();
        for _ in 0..count {
            let synonym: String = bincode::decode_from_std_read(in_buf, bincode_config)?;
            let name: String = bincode::decode_from_std_read(in_buf, bincode_config)?;
            synonyms.insert(synonym, name);
        }

        let count: u64 = bincode::decode_from_std_read(in_buf, bincode_config)?;
        let mut sections = BTreeMap::new();
        for _ in 0..count {
            let name: String = bincode::decode_from_std_read(in_buf, bincode_config)?;
            let begin: u64 = bincode::decode_from_std_read(in_buf, bincode_config)?;
            let end: u64 = bincode::decode_from_std_read(in_buf, bincode_config)?;
            let end = (end != u64::MAX).then_some(end);
            sections.insert(name, FileRange { begin, end });
        }

        log::debug!("Read jasix index with {} chromosomes", chromosomes.len());
        Ok(JasixIndex::from_parts(header, chromosomes, synonyms, sections))
    }

    /// Writes the index through a block stream
    pub fn write_compressed<W: Write>(&self, out_buf: W, parameters: &Parameters) -> Result<W>
    {
        let mut writer = BlockWriter::with_compressor(out_buf, parameters.compression.clone())
            .with_block_size(parameters.block_size);
        self.write(&mut writer)?;
        writer.finish()
    }

    /// Blocks carry their codec, so a stream written with any compression
    /// type reads back whatever `parameters.compression` says
    pub fn read_compressed<R: Read>(in_buf: R, parameters: &Parameters) -> Result<Self>
    {
        JasixIndex::read(BlockReader::with_compressor(in_buf, parameters.compression.clone()))
    }

    /// Opens a `.jsi` file, plain or written by `write_compressed`
    pub fn from_path<P: AsRef<Path>>(path: P, parameters: &Parameters) -> Result<Self>
    {
        let mut bytes = Vec::new();
        BufReader::new(File::open(path.as_ref())?).read_to_end(&mut bytes)?;
        if bytes.starts_with(&BLOCK_MAGIC.to_le_bytes()) {
            JasixIndex::read_compressed(&bytes[..], parameters)
        } else {
            JasixIndex::read(&bytes[..])
        }
    }

    /// Writes a plain index, or a block compressed one when `parameters`
    /// are given
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P, parameters: Option<&Parameters>) -> Result<()>
    {
        let mut out_buf = BufWriter::new(File::create(path.as_ref())?);
        match parameters {
            Some(parameters) => {
                self.write_compressed(&mut out_buf, parameters)?;
            }
            None => self.write(&mut out_buf)?,
        }
        out_buf.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use libcompression::CompressionType;

    fn two_chromosomes(with_synonyms: bool) -> JasixIndex
    {
        let mut builder = JasixIndexBuilder::default();
        let records = [
            ("chr1", 100, 101, 100_000),
            ("chr1", 105, 109, 100_050),
            ("chr1", 150, 1000, 100_075),
            ("chr1", 160, 166, 100_100),
            ("chr2", 100, 100, 100_150),
            ("chr2", 102, 105, 100_200),
        ];
        for (chromosome, start, end, location) in records {
            if with_synonyms {
                let synonym = chromosome.trim_start_matches("chr");
                builder
                    .add_with_synonym(chromosome, start, end, location, synonym)
                    .unwrap();
            } else {
                builder.add(chromosome, start, end, location).unwrap();
            }
        }
        builder.flush()
    }

    fn check_two_chromosomes(index: &JasixIndex)
    {
        assert_eq!(index.first_variant_offset("chr1", 100, 102), Some(100_000));
        assert_eq!(index.first_variant_offset("chr1", 103, 104), Some(100_000));
        assert_eq!(index.first_variant_offset("chr1", 120, 124), Some(100_000));
        assert_eq!(index.first_variant_offset("chr1", 158, 160), Some(100_000));
        assert_eq!(index.first_variant_offset("chr2", 103, 105), Some(100_150));

        assert!(index.large_variant_offsets("chr1", 100, 149).is_empty());
        assert_eq!(index.large_variant_offsets("chr1", 100, 201), vec![100_075]);
    }

    #[test]
    fn fill_node_and_start_another()
    {
        let mut builder = JasixIndexBuilder::default();
        for i in 0..100 {
            builder
                .add("chr1", 100 + i, 101 + i, 100_000 + i as u64)
                .unwrap();
        }
        builder.add("chr1", 260, 266, 200_100).unwrap();
        builder.add("chr2", 100, 100, 200_150).unwrap();
        builder.add("chr2", 102, 105, 200_200).unwrap();
        let index = builder.flush();

        assert_eq!(index.first_variant_offset("chr1", 100, 102), Some(100_000));
        assert_eq!(index.first_variant_offset("chr1", 155, 155), Some(100_050));
        assert_eq!(index.first_variant_offset("chr1", 220, 224), None);
        assert_eq!(index.first_variant_offset("chr1", 258, 260), Some(200_100));
        assert_eq!(index.first_variant_offset("chr2", 103, 105), Some(200_150));
    }

    #[test]
    fn whole_chromosome_queries()
    {
        let index = two_chromosomes(false);
        assert_eq!(index.first_variant_offset("chr1", 1, i32::MAX), Some(100_000));
        assert_eq!(index.first_variant_offset("chr2", 1, i32::MAX), Some(100_150));
        assert_eq!(index.first_variant_offset("chr3", 1, i32::MAX), None);
        assert!(index.large_variant_offsets("chr3", 1, i32::MAX).is_empty());
    }

    #[test]
    fn large_variants_are_not_small()
    {
        let mut builder = JasixIndexBuilder::default();
        builder.add("chr1", 100, 101, 100_000).unwrap();
        builder.add("chr1", 105, 109, 100_050).unwrap();
        builder.add("chr1", 160, 166, 100_100).unwrap();
        builder.add("chr1", 200, 1000, 100_075).unwrap();
        builder.add("chr2", 100, 100, 100_150).unwrap();
        let index = builder.flush();

        assert!(index.large_variant_offsets("chr1", 100, 199).is_empty());
        assert_eq!(index.large_variant_offsets("chr1", 100, 201), vec![100_075]);
    }

    #[test]
    fn write_and_read_back()
    {
        let index = two_chromosomes(true);
        check_two_chromosomes(&index);

        let mut bytes = Vec::new();
        index.write(&mut bytes).unwrap();
        let read_back = JasixIndex::read(&bytes[..]).unwrap();
        check_two_chromosomes(&read_back);

        assert_eq!(read_back.canonical_name("1"), Some("chr1"));
        assert_eq!(read_back.canonical_name("chr2"), Some("chr2"));
        assert_eq!(read_back.canonical_name("3"), None);
        assert!(read_back.contains_chromosome("2"));
        assert_eq!(read_back.first_variant_offset("2", 103, 105), Some(100_150));
        assert_eq!(read_back.chromosomes().collect::<Vec<_>>(), vec!["chr1", "chr2"]);
    }

    #[test]
    fn compressed_index_reads_back()
    {
        let index = two_chromosomes(false);
        let parameters = Parameters::default();
        let bytes = index.write_compressed(Vec::new(), &parameters).unwrap();
        let read_back = JasixIndex::read_compressed(&bytes[..], &parameters).unwrap();
        check_two_chromosomes(&read_back);
    }

    #[test]
    fn compressed_index_reads_back_with_any_codec()
    {
        let index = two_chromosomes(true);
        for ct in [CompressionType::ZSTD, CompressionType::ZLIB, CompressionType::NONE] {
            let written_with = Parameters::default().with_compression_type(ct);
            let bytes = index.write_compressed(Vec::new(), &written_with).unwrap();
            assert!(bytes.starts_with(&BLOCK_MAGIC.to_le_bytes()));

            let read_back = JasixIndex::read_compressed(&bytes[..], &Parameters::default()).unwrap();
            assert_eq!(read_back, index, "{:?}", ct);
        }
    }

    #[test]
    fn version_mismatch_is_a_format_error()
    {
        let mut bytes = Vec::new();
        two_chromosomes(false).write(&mut bytes).unwrap();
        // varint zigzag of 1
        assert_eq!(bytes[0], 2);
        bytes[0] = 4;
        let err = JasixIndex::read(&bytes[..]).unwrap_err();
        assert!(err.is_format_error());

        let err = JasixIndex::read(&[][..]).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn sections_begin_and_end_once()
    {
        let mut builder = JasixIndexBuilder::default();
        builder.begin_section("section1", 0).unwrap();
        assert!(builder.begin_section("section1", 1).unwrap_err().is_input_error());
        builder.end_section("section1", 100).unwrap();
        assert!(builder.end_section("section1", 101).unwrap_err().is_input_error());
        builder.end_section("never", 5).unwrap();
        builder.begin_section("open", 7).unwrap();

        let mut bytes = Vec::new();
        builder.flush().write(&mut bytes).unwrap();
        let index = JasixIndex::read(&bytes[..]).unwrap();

        assert_eq!(index.section_begin("section1"), Some(0));
        assert_eq!(index.section_end("section1"), Some(100));
        assert_eq!(index.section_begin("open"), Some(7));
        assert_eq!(index.section_end("open"), None);
        assert_eq!(index.section("never"), None);
    }

    #[test]
    fn index_is_shareable()
    {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JasixIndex>();
    }
}
