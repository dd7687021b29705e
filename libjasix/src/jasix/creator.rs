use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    time::Instant,
};

use super::{
    json::chrom_position, JasixIndex, JasixIndexBuilder, FILE_EXT, GENES_SECTION_TAG, HEADER_SECTION_TAG,
    POSITIONS_SECTION_TAG,
};
use crate::{
    bgzf::BgzfReader,
    error::{Error, Result},
    parameters::Parameters,
    virtual_position::VirtualPosition,
};

/// `<json>.jsi`
pub fn index_path<P: AsRef<Path>>(json_path: P) -> PathBuf
{
    let mut path = json_path.as_ref().as_os_str().to_owned();
    path.push(FILE_EXT);
    PathBuf::from(path)
}

/// Builds a jasix index from a BGZF compressed annotation file in one pass
pub struct IndexCreator<R: Read>
{
    reader: BgzfReader<R>,
    builder: JasixIndexBuilder,
    processed_chromosomes: HashSet<String>,
    line: String,
}

impl IndexCreator<BufReader<File>>
{
    pub fn from_path<P: AsRef<Path>>(path: P, parameters: Parameters) -> Result<Self>
    {
        Ok(IndexCreator::new(BgzfReader::from_path(path)?, parameters))
    }
}

impl<R: Read> IndexCreator<R>
{
    pub fn new(reader: BgzfReader<R>, parameters: Parameters) -> Self
    {
        IndexCreator {
            reader,
            builder: JasixIndexBuilder::new(parameters),
            processed_chromosomes: HashSet::new(),
            line: String::new(),
        }
    }

    pub fn create_index(mut self) -> Result<JasixIndex>
    {
        let timer = Instant::now();

        self.index_header()?;
        if let Some(last_line) = self.index_positions()? {
            self.index_genes(last_line)?;
        }

        let index = self.builder.flush();
        log::info!("Indexing took {:?}", timer.elapsed());
        Ok(index)
    }

    /// Next line without its line ending, and where it starts
    fn next_line(&mut self) -> Result<Option<(VirtualPosition, String)>>
    {
        match self.reader.read_line_at(&mut self.line)? {
            Some(position) => Ok(Some((
                position,
                self.line.trim_end_matches(['\n', '\r']).to_string(),
            ))),
            None => Ok(None),
        }
    }

    fn index_header(&mut self) -> Result<()>
    {
        let header_tag = format!("{{\"{}\":", HEADER_SECTION_TAG);
        let positions_tag = format!("\"{}\":[", POSITIONS_SECTION_TAG);

        let mut header: Option<String> = None;
        while let Some((position, line)) = self.next_line()? {
            if line.starts_with(&header_tag) {
                self.builder.begin_section(HEADER_SECTION_TAG, position.value())?;
                header = Some(String::new());
            }
            if let Some(header) = header.as_mut() {
                header.push_str(&line);
            }

            if line.ends_with(&positions_tag) {
                self.builder.end_section(HEADER_SECTION_TAG, position.value())?;
                break;
            }
        }

        if let Some(header) = header {
            // `{"header":{...},"positions":[` keeps `"header":{...}`
            let header = header.strip_prefix('{').unwrap_or(&header);
            let header = header
                .strip_suffix(&format!(",{}", positions_tag))
                .unwrap_or(header);
            self.builder.set_header(header);
        }
        Ok(())
    }

    /// Returns the line that closed the positions section
    fn index_positions(&mut self) -> Result<Option<String>>
    {
        let begin = self.reader.virtual_position();
        self.builder.begin_section(POSITIONS_SECTION_TAG, begin.value())?;

        let mut previous_chromosome = String::new();
        let mut previous_position = 0;
        let mut chromosome_timer = Instant::now();

        while let Some((line_position, line)) = self.next_line()? {
            if line.starts_with(']') {
                self.builder.end_section(POSITIONS_SECTION_TAG, line_position.value())?;
                if !previous_chromosome.is_empty() {
                    log::info!("Ref Sequence {} indexed in {:?}", previous_chromosome, chromosome_timer.elapsed());
                }
                return Ok(Some(line));
            }

            let (chromosome, position, end) = chrom_position(line.trim_end_matches(','))?;

            if chromosome != previous_chromosome {
                if self.processed_chromosomes.contains(&chromosome) {
                    return Err(Error::input(format!(
                        "the json file is not sorted at {}: {}",
                        chromosome, position
                    )));
                }
                if !previous_chromosome.is_empty() {
                    log::info!("Ref Sequence {} indexed in {:?}", previous_chromosome, chromosome_timer.elapsed());
                    chromosome_timer = Instant::now();
                    self.processed_chromosomes
                        .insert(std::mem::take(&mut previous_chromosome));
                }
            } else if position < previous_position {
                return Err(Error::input(format!(
                    "the json file is not sorted at {}: {}",
                    chromosome, position
                )));
            }

            self.builder
                .add(&chromosome, position, end, line_position.value())?;
            previous_chromosome = chromosome;
            previous_position = position;
        }

        log::warn!("The positions section is not closed");
        Ok(None)
    }

    fn index_genes(&mut self, last_line: String) -> Result<()>
    {
        let genes_tag = format!(",\"{}\":[", GENES_SECTION_TAG);

        let mut line = last_line;
        let mut line_position = None;
        loop {
            if line.ends_with(&genes_tag) {
                let begin = self.reader.virtual_position();
                self.builder.begin_section(GENES_SECTION_TAG, begin.value())?;
            }
            // Gene objects may themselves end in `]}`
            if line.trim() == "]}" {
                if let Some(position) = line_position {
                    self.builder.end_section(GENES_SECTION_TAG, position)?;
                }
                break;
            }

            match self.next_line()? {
                Some((position, next)) => {
                    line_position = Some(position.value());
                    line = next;
                }
                None => break,
            }
        }
        Ok(())
    }
}
