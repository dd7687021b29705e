use serde::Deserialize;

use crate::error::Result;

/// Fields of a position line needed for indexing. Everything else in the
/// line is ignored.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord
{
    pub chromosome: String,
    pub position: i32,
    #[serde(default)]
    pub ref_allele: Option<String>,
    #[serde(default)]
    pub alt_alleles: Vec<String>,
    #[serde(default)]
    pub sv_end: Option<i32>,
}

fn is_plain_bases(allele: &str) -> bool
{
    !allele.is_empty()
        && allele
            .bytes()
            .all(|b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T' | b'N'))
}

impl PositionRecord
{
    pub fn parse(line: &str) -> Result<Self>
    {
        match serde_json::from_str(line) {
            Ok(record) => Ok(record),
            Err(e) => {
                log::error!("Unable to parse json line: {}", line);
                Err(e.into())
            }
        }
    }

    /// Last reference base the record touches
    pub fn end(&self) -> i32
    {
        if let Some(sv_end) = self.sv_end {
            return sv_end;
        }

        let ref_len = self.ref_allele.as_deref().map_or(1, str::len).max(1) as i32;
        let mut end = self.position.saturating_add(ref_len - 1);

        // Insertions reach one base past the reference
        if self
            .alt_alleles
            .iter()
            .any(|a| is_plain_bases(a) && a.len() as i32 > ref_len)
        {
            end = end.saturating_add(1);
        }
        end
    }
}

/// Chromosome, position and end of a position line
pub fn chrom_position(line: &str) -> Result<(String, i32, i32)>
{
    let record = PositionRecord::parse(line)?;
    let end = record.end();
    Ok((record.chromosome, record.position, end))
}

#[cfg(test)]
mod tests
{
    use super::*;

    const TRANSCRIPTS: &str = r#""variants":[{"altAllele":"C","refAllele":"-","begin":2337968,"chromosome":"chr1","dbsnp":["rs797044762"],"end":2337967,"variantType":"insertion","vid":"1:2337968:2337967:C","transcripts":{"refSeq":[{"transcript":"NM_002617.3","bioType":"protein_coding","hgnc":"PEX10","consequence":["frameshift_variant"]}]}}]"#;

    fn line(ref_allele: &str, alts: &str) -> String
    {
        format!(
            r#"{{"chromosome":"chr1","refAllele":"{}","position":2337967,"altAlleles":[{}],"cytogeneticBand":"1p36.32",{}}}"#,
            ref_allele, alts, TRANSCRIPTS
        )
    }

    #[test]
    fn deletion()
    {
        let parsed = chrom_position(&line("GT", r#""G""#)).unwrap();
        assert_eq!(parsed, ("chr1".to_string(), 2337967, 2337968));
    }

    #[test]
    fn snv()
    {
        let parsed = chrom_position(&line("G", r#""C","T""#)).unwrap();
        assert_eq!(parsed, ("chr1".to_string(), 2337967, 2337967));
    }

    #[test]
    fn insertion()
    {
        let parsed = chrom_position(&line("G", r#""GCC""#)).unwrap();
        assert_eq!(parsed, ("chr1".to_string(), 2337967, 2337968));
    }

    #[test]
    fn structural_variant()
    {
        let line = r#"{"chromosome":"chr3","refAllele":"A","position":62431401,"svEnd":62431801,"altAlleles":["<DEL>"],"cytogeneticBand":"3p14.2","variants":[{"altAllele":"<DEL>","refAllele":"A","begin":62431402,"chromosome":"chr3","end":62431801,"variantType":"unknown"}]}"#;
        let parsed = chrom_position(line).unwrap();
        assert_eq!(parsed, ("chr3".to_string(), 62431401, 62431801));
    }

    #[test]
    fn breakend()
    {
        let line = r#"{"chromosome":"2","refAllele":"G","position":321681,"quality":6,"filters":["PASS"],"altAlleles":["G]2:421681]"],"cytogeneticBand":"2p25.3","variants":[{"altAllele":"G]2:421681]","refAllele":"G","begin":321681,"chromosome":"2","end":321686,"variantType":"translocation_breakend"}]}"#;
        let parsed = chrom_position(line).unwrap();
        assert_eq!(parsed, ("2".to_string(), 321681, 321681));
    }

    #[test]
    fn malformed_line_is_an_input_error()
    {
        let err = chrom_position(r#"{"chromosome":"chr1","position":"#).unwrap_err();
        assert!(err.is_input_error());
        let err = chrom_position(r#"{"position":100}"#).unwrap_err();
        assert!(err.is_input_error());
    }
}
