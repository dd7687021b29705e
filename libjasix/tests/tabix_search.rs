use std::{
    collections::BTreeMap,
    io::{Cursor, Write},
};

use libjasix::{
    bins::{first_bin_of_level, DEPTH, MIN_SHIFT},
    prelude::*,
    tabix::{Chunk, ReferenceSequence},
};

struct IndexedVcf
{
    bytes: Vec<u8>,
    index: TabixIndex,
    starts: Vec<(String, i32, VirtualPosition)>,
}

/// Smallest bin holding the whole 0-based range [begin, end)
fn range_bin(begin: u64, end: u64) -> u32
{
    let mut level = DEPTH;
    loop {
        let shift = MIN_SHIFT + 3 * (DEPTH - level);
        if begin >> shift == (end - 1) >> shift {
            return first_bin_of_level(level) + (begin >> shift) as u32;
        }
        level -= 1;
    }
}

fn indexed_vcf(records: &[(&str, i32)]) -> IndexedVcf
{
    let records: Vec<(&str, i32, &str)> = records.iter().map(|(c, p)| (*c, *p, "A")).collect();
    indexed_vcf_with_refs(&records)
}

/// Writes a bgzf VCF and indexes it the way tabix does, binning each
/// record by the span of its reference allele
fn indexed_vcf_with_refs(records: &[(&str, i32, &str)]) -> IndexedVcf
{
    let mut writer = BgzfWriter::new(Vec::new());
    writeln!(writer, "##fileformat=VCFv4.2").unwrap();
    writeln!(writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO").unwrap();

    let mut references: Vec<(String, BTreeMap<u32, Vec<Chunk>>, Vec<u64>)> = Vec::new();
    let mut starts = Vec::new();

    for (chromosome, position, ref_allele) in records {
        let start = writer.virtual_position();
        writeln!(writer, "{}\t{}\t.\t{}\tC\t50\tPASS\tDP=10", chromosome, position, ref_allele).unwrap();
        let end = writer.virtual_position();
        starts.push((chromosome.to_string(), *position, start));

        if references.last().map_or(true, |r| r.0 != *chromosome) {
            references.push((chromosome.to_string(), BTreeMap::new(), Vec::new()));
        }
        let (_, bins, linear) = references.last_mut().unwrap();

        let begin = (*position - 1) as u64;
        let chunks = bins.entry(range_bin(begin, begin + ref_allele.len() as u64)).or_default();
        match chunks.last_mut() {
            Some(last) if last.end == start => last.end = end,
            _ => chunks.push(Chunk { begin: start, end }),
        }

        let window = (begin >> MIN_SHIFT) as usize;
        if linear.len() <= window {
            linear.resize(window + 1, 0);
        }
        if linear[window] == 0 {
            linear[window] = start.value();
        }
    }

    let references = references
        .into_iter()
        .map(|(name, bins, mut linear)| {
            for i in 1..linear.len() {
                if linear[i] == 0 {
                    linear[i] = linear[i - 1];
                }
            }
            ReferenceSequence::new(name, bins, linear)
        })
        .collect();

    IndexedVcf {
        bytes: writer.finish().unwrap(),
        index: TabixIndex::new(references),
        starts,
    }
}

fn sample() -> IndexedVcf
{
    let mut records: Vec<(&str, i32)> = (0..6000).map(|i| ("1", 1000 + 37 * i)).collect();
    records.extend((0..200).map(|i| ("2", 500 + 90 * i)));
    indexed_vcf(&records)
}

fn reader(vcf: &IndexedVcf) -> BgzfReader<Cursor<Vec<u8>>>
{
    BgzfReader::new(Cursor::new(vcf.bytes.clone()))
}

/// First record at or after `position`, reading forward from `offset`
fn scan_from(
    reader: &mut BgzfReader<Cursor<Vec<u8>>>,
    offset: u64,
    chromosome: &str,
    position: i32,
) -> Option<(i32, VirtualPosition)>
{
    reader.seek(VirtualPosition::new(offset)).unwrap();
    let mut line = String::new();
    while let Some(start) = reader.read_line_at(&mut line).unwrap() {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields[0] != chromosome {
            continue;
        }
        let found: i32 = fields[1].parse().unwrap();
        if found >= position {
            return Some((found, start));
        }
    }
    None
}

#[test]
fn stream_spans_several_blocks()
{
    let vcf = sample();
    let (_, _, last) = vcf.starts.last().unwrap();
    assert!(last.file_offset() > 0);
}

#[test]
fn offset_for_reaches_every_record()
{
    let vcf = sample();
    let mut reader = reader(&vcf);

    for (chromosome, position, start) in vcf.starts.iter().step_by(97) {
        let offset = vcf.index.offset_for(chromosome, *position).unwrap();
        assert!(offset <= start.value(), "{}:{} offset {} past record", chromosome, position, offset);

        let (found, found_at) = scan_from(&mut reader, offset, chromosome, *position).unwrap();
        assert_eq!(found, *position);
        assert_eq!(found_at, *start);
    }
}

#[test]
fn offset_for_between_records_finds_the_next()
{
    let vcf = sample();
    let mut reader = reader(&vcf);
    let offset = vcf.index.offset_for("1", 1038).unwrap();
    let (found, _) = scan_from(&mut reader, offset, "1", 1038).unwrap();
    assert_eq!(found, 1074);
}

#[test]
fn offset_for_unknown_chromosome_is_none()
{
    let vcf = sample();
    assert_eq!(vcf.index.offset_for("7", 1000), None);
}

#[test]
fn has_variants_checks_boundary_bins()
{
    let vcf = sample();
    let mut reader = reader(&vcf);

    assert!(vcf.index.has_variants(&mut reader, "1", 1037, 1037).unwrap());
    assert!(vcf.index.has_variants(&mut reader, "1", 1001, 1037).unwrap());
    assert!(!vcf.index.has_variants(&mut reader, "1", 1001, 1036).unwrap());
    assert!(!vcf.index.has_variants(&mut reader, "1", 1, 999).unwrap());
    assert!(!vcf.index.has_variants(&mut reader, "1", 300_000, 400_000).unwrap());
    assert!(!vcf.index.has_variants(&mut reader, "X", 1, 1_000_000).unwrap());

    assert!(vcf.index.has_variants(&mut reader, "2", 500, 500).unwrap());
    assert!(!vcf.index.has_variants(&mut reader, "2", 501, 589).unwrap());
}

#[test]
fn has_variants_across_internal_bins()
{
    let vcf = sample();
    let mut reader = reader(&vcf);
    assert!(vcf.index.has_variants(&mut reader, "1", 1001, 100_000).unwrap());
}

#[test]
fn has_variants_through_aliases()
{
    let mut vcf = sample();
    let mut reader = reader(&vcf);
    assert!(!vcf.index.has_variants(&mut reader, "chr1", 1037, 1037).unwrap());

    vcf.index.add_chr_prefix_aliases();
    assert!(vcf.index.has_variants(&mut reader, "chr1", 1037, 1037).unwrap());
    assert!(vcf.index.has_variants(&mut reader, "chr2", 590, 590).unwrap());
}

#[test]
fn has_variants_finds_records_in_coarser_bins()
{
    // 0-based [16379, 16389) crosses the first leaf window into bin 585
    let vcf = indexed_vcf_with_refs(&[("1", 16_300, "A"), ("1", 16_380, "ACGTACGTAC"), ("1", 16_500, "A")]);
    assert_eq!(range_bin(16_379, 16_389), 585);
    assert!(vcf.index.references()[0].has_bin(585));
    let mut reader = reader(&vcf);

    assert!(vcf.index.has_variants(&mut reader, "1", 16_380, 16_380).unwrap());
    assert!(vcf.index.has_variants(&mut reader, "1", 16_370, 16_385).unwrap());
    assert!(!vcf.index.has_variants(&mut reader, "1", 16_381, 16_390).unwrap());
    assert!(vcf.index.has_variants(&mut reader, "1", 16_384, 16_500).unwrap());
    assert!(!vcf.index.has_variants(&mut reader, "1", 16_501, 40_000).unwrap());
}

#[test]
fn chunks_for_cover_the_region()
{
    let vcf = sample();
    let chunks = vcf.index.chunks_for("1", 20_000, 40_000);
    assert!(!chunks.is_empty());

    let inside: Vec<&VirtualPosition> = vcf
        .starts
        .iter()
        .filter(|(c, p, _)| c == "1" && (20_000..=40_000).contains(p))
        .map(|(_, _, start)| start)
        .collect();
    for start in inside {
        assert!(
            chunks.iter().any(|c| c.begin <= *start && *start < c.end),
            "record at {} outside chunks",
            start
        );
    }
}

#[test]
fn index_file_round_trip()
{
    let vcf = sample();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.vcf.gz.tbi");

    let bytes = vcf.index.write_bgzf(Vec::new()).unwrap();
    std::fs::write(&path, &bytes).unwrap();
    let read_back = TabixIndex::from_path(&path).unwrap();
    assert_eq!(read_back, vcf.index);

    for (chromosome, position, _) in vcf.starts.iter().step_by(501) {
        assert_eq!(
            read_back.offset_for(chromosome, *position),
            vcf.index.offset_for(chromosome, *position)
        );
    }

    let mut raw = Vec::new();
    vcf.index.write(&mut raw).unwrap();
    let raw_path = dir.path().join("raw.tbi");
    std::fs::write(&raw_path, &raw).unwrap();
    assert_eq!(TabixIndex::from_path(&raw_path).unwrap(), vcf.index);
}
