use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, Read, Seek, Write},
    path::Path,
};

use super::{json::chrom_position, JasixIndex, HEADER_SECTION_TAG, POSITIONS_SECTION_TAG};
use crate::{
    bgzf::BgzfReader,
    error::Result,
    parameters::Parameters,
    utils::{alternate_chromosome_name, parse_query, Region},
    virtual_position::VirtualPosition,
};

/// Answers region queries against an indexed annotation file and writes
/// the results as json
pub struct QueryProcessor<R: Read + Seek, W: Write>
{
    reader: BgzfReader<R>,
    index: JasixIndex,
    writer: W,
    line: String,
}

impl<W: Write> QueryProcessor<BufReader<File>, W>
{
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        json_path: P,
        index_path: Q,
        parameters: &Parameters,
        writer: W,
    ) -> Result<Self>
    {
        let index = JasixIndex::from_path(index_path, parameters)?;
        Ok(QueryProcessor::new(BgzfReader::from_path(json_path)?, index, writer))
    }
}

impl<R: Read + Seek, W: Write> QueryProcessor<R, W>
{
    pub fn new(reader: BgzfReader<R>, index: JasixIndex, writer: W) -> Self
    {
        QueryProcessor {
            reader,
            index,
            writer,
            line: String::new(),
        }
    }

    pub fn index(&self) -> &JasixIndex
    {
        &self.index
    }

    pub fn into_writer(self) -> W
    {
        self.writer
    }

    /// Chromosome as named in the index, trying the other naming
    /// convention when the name itself is unknown
    pub fn resolve_chromosome(&self, chromosome: &str) -> Option<String>
    {
        self.index
            .canonical_name(chromosome)
            .or_else(|| self.index.canonical_name(&alternate_chromosome_name(chromosome)))
            .map(str::to_string)
    }

    fn next_line(&mut self) -> Result<Option<&str>>
    {
        Ok(self
            .reader
            .read_line_at(&mut self.line)?
            .map(|_| self.line.trim_end_matches(['\n', '\r'])))
    }

    /// `"header":{...}` from the index, or from the header section of the
    /// file for indexes that do not store it
    pub fn header(&mut self) -> Result<String>
    {
        if !self.index.header().is_empty() {
            return Ok(self.index.header().to_string());
        }

        let Some(begin) = self.index.section_begin(HEADER_SECTION_TAG) else {
            return Ok(String::new());
        };
        self.reader.seek(VirtualPosition::new(begin))?;

        let positions_tag = format!(",\"{}\":[", POSITIONS_SECTION_TAG);
        let Some(line) = self.next_line()? else {
            return Ok(String::new());
        };
        let header = line.strip_prefix('{').unwrap_or(line);
        Ok(header.strip_suffix(&positions_tag).unwrap_or(header).to_string())
    }

    pub fn print_header_only(&mut self) -> Result<()>
    {
        let header = self.header()?;
        writeln!(self.writer, "{{{}}}", header)?;
        Ok(())
    }

    pub fn print_chromosome_list(&mut self) -> Result<()>
    {
        for chromosome in self.index.chromosomes() {
            writeln!(self.writer, "{}", chromosome)?;
        }
        Ok(())
    }

    /// Lines of large variants that start before the region and reach into
    /// it
    pub fn read_json_lines_extending_into(&mut self, region: &Region) -> Result<Vec<String>>
    {
        let Some(chromosome) = self.resolve_chromosome(&region.chromosome) else {
            return Ok(Vec::new());
        };

        let offsets = self
            .index
            .large_variant_offsets(&chromosome, region.start, region.start.saturating_sub(1));

        let mut lines = Vec::with_capacity(offsets.len());
        for offset in offsets {
            self.reader.seek(VirtualPosition::new(offset))?;
            if let Some(line) = self.next_line()? {
                lines.push(line.trim_end_matches(',').to_string());
            }
        }
        Ok(lines)
    }

    /// Lines overlapping the region, except large variants that start
    /// before it
    pub fn read_overlapping_json_lines(&mut self, region: &Region) -> Result<Vec<String>>
    {
        let Some(chromosome) = self.resolve_chromosome(&region.chromosome) else {
            return Ok(Vec::new());
        };
        let Some(offset) = self
            .index
            .first_variant_offset(&chromosome, region.start, region.end)
        else {
            return Ok(Vec::new());
        };

        let extending: HashSet<u64> = self
            .index
            .large_variant_offsets(&chromosome, region.start, region.start.saturating_sub(1))
            .into_iter()
            .collect();

        self.reader.seek(VirtualPosition::new(offset))?;
        let mut lines = Vec::new();
        loop {
            let line_start = self.reader.virtual_position().value();
            let Some(line) = self.next_line()? else {
                break;
            };
            if line.starts_with(']') {
                break;
            }
            let line = line.trim_end_matches(',').to_string();

            let (line_chromosome, position, end) = chrom_position(&line)?;
            if line_chromosome != chromosome || position > region.end {
                break;
            }
            if end < region.start || extending.contains(&line_start) {
                continue;
            }
            lines.push(line);
        }
        Ok(lines)
    }

    /// Writes every line matching `queries` as one json document and
    /// returns how many were written
    pub fn process_query<S: AsRef<str>>(&mut self, queries: &[S], print_header: bool) -> Result<usize>
    {
        let mut lines = Vec::new();
        for query in queries {
            let region = parse_query(query.as_ref())?;
            log::debug!("Querying {}", region);
            lines.extend(self.read_json_lines_extending_into(&region)?);
            lines.extend(self.read_overlapping_json_lines(&region)?);
        }

        if print_header {
            let header = self.header()?;
            writeln!(self.writer, "{{{},\"{}\":[", header, POSITIONS_SECTION_TAG)?;
        } else {
            writeln!(self.writer, "{{\"{}\":[", POSITIONS_SECTION_TAG)?;
        }
        for (i, line) in lines.iter().enumerate() {
            if i + 1 < lines.len() {
                writeln!(self.writer, "{},", line)?;
            } else {
                writeln!(self.writer, "{}", line)?;
            }
        }
        writeln!(self.writer, "]}}")?;
        self.writer.flush()?;

        Ok(lines.len())
    }
}

#[cfg(test)]
mod tests
{
    use std::io::Cursor;

    use super::*;
    use crate::{
        bgzf::BgzfWriter,
        jasix::IndexCreator,
    };

    fn record(chromosome: &str, position: i32, sv_end: Option<i32>) -> String
    {
        match sv_end {
            Some(sv_end) => format!(
                r#"{{"chromosome":"{}","refAllele":"A","position":{},"svEnd":{},"altAlleles":["<DEL>"]}}"#,
                chromosome, position, sv_end
            ),
            None => format!(
                r#"{{"chromosome":"{}","refAllele":"A","position":{},"altAlleles":["C"]}}"#,
                chromosome, position
            ),
        }
    }

    fn annotated_file() -> Vec<u8>
    {
        let records = [
            record("chr1", 9_000, Some(10_005)),
            record("chr1", 9_500, Some(10_050)),
            record("chr1", 9_990, None),
            record("chr1", 10_000, None),
            record("chr1", 10_004, None),
            record("chr1", 10_009, Some(10_550)),
            record("chr1", 10_021, None),
            record("chr2", 500, None),
        ];

        let mut writer = BgzfWriter::new(Vec::new());
        writeln!(writer, r#"{{"header":{{"annotator":"test"}},"positions":["#).unwrap();
        for (i, r) in records.iter().enumerate() {
            let separator = if i + 1 < records.len() { "," } else { "" };
            writeln!(writer, "{}{}", r, separator).unwrap();
        }
        writeln!(writer, "]}}").unwrap();
        writer.finish().unwrap()
    }

    fn processor() -> QueryProcessor<Cursor<Vec<u8>>, Vec<u8>>
    {
        let bytes = annotated_file();
        let index = IndexCreator::new(BgzfReader::new(&bytes[..]), Parameters::default())
            .create_index()
            .unwrap();
        QueryProcessor::new(BgzfReader::new(Cursor::new(bytes)), index, Vec::new())
    }

    fn positions(lines: &[String]) -> Vec<i32>
    {
        lines.iter().map(|l| chrom_position(l).unwrap().1).collect()
    }

    #[test]
    fn overlapping_and_extending_lines()
    {
        let mut qp = processor();
        let region = parse_query("chr1:10000-10020").unwrap();

        let overlapping = qp.read_overlapping_json_lines(&region).unwrap();
        assert_eq!(positions(&overlapping), vec![10_000, 10_004, 10_009]);

        let extending = qp.read_json_lines_extending_into(&region).unwrap();
        assert_eq!(positions(&extending), vec![9_000, 9_500]);
    }

    #[test]
    fn scan_stops_at_other_chromosome()
    {
        let mut qp = processor();
        let lines = qp.read_overlapping_json_lines(&parse_query("chr1:10021").unwrap()).unwrap();
        assert_eq!(positions(&lines), vec![10_021]);

        let lines = qp.read_overlapping_json_lines(&parse_query("chr2").unwrap()).unwrap();
        assert_eq!(positions(&lines), vec![500]);
    }

    #[test]
    fn ensembl_names_resolve_on_the_fly()
    {
        let mut qp = processor();
        let ucsc = qp.process_query(&["chr1"], false).unwrap();
        let ensembl = qp.process_query(&["1"], false).unwrap();
        assert_eq!(ucsc, 7);
        assert_eq!(ensembl, 7);
        assert_eq!(qp.process_query(&["chr9"], false).unwrap(), 0);
    }

    #[test]
    fn header_and_chromosome_list()
    {
        let mut qp = processor();
        assert_eq!(qp.header().unwrap(), r#""header":{"annotator":"test"}"#);
        qp.print_header_only().unwrap();
        qp.print_chromosome_list().unwrap();
        let output = String::from_utf8(qp.into_writer()).unwrap();
        assert_eq!(output, "{\"header\":{\"annotator\":\"test\"}}\nchr1\nchr2\n");
    }

    #[test]
    fn query_output_is_json()
    {
        let mut qp = processor();
        let count = qp.process_query(&["chr1:10000-10005"], true).unwrap();
        assert_eq!(count, 4);

        let output = String::from_utf8(qp.into_writer()).unwrap();
        let document: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(document["header"]["annotator"], "test");
        assert_eq!(document["positions"].as_array().unwrap().len(), 4);
    }
}
