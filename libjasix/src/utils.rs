use crate::error::{Error, Result};

/// A chromosome range, 1-based and closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region
{
    pub chromosome: String,
    pub start: i32,
    pub end: i32,
}

impl Region
{
    pub fn new<S: Into<String>>(chromosome: S, start: i32, end: i32) -> Self
    {
        Region {
            chromosome: chromosome.into(),
            start,
            end,
        }
    }
}

impl std::fmt::Display for Region
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

fn parse_position(text: &str, query: &str) -> Result<i32>
{
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    cleaned
        .trim()
        .parse::<i32>()
        .map_err(|_| Error::input(format!("invalid position '{}' in query '{}'", text, query)))
}

/// Parses `chr`, `chr:pos` or `chr:start-end`. A bare chromosome covers
/// the whole chromosome. Thousands separators are allowed in positions.
pub fn parse_query(query: &str) -> Result<Region>
{
    let query = query.trim();
    let (chromosome, range) = match query.split_once(':') {
        Some((chromosome, range)) => (chromosome, Some(range)),
        None => (query, None),
    };

    if chromosome.is_empty() {
        return Err(Error::input(format!("missing chromosome in query '{}'", query)));
    }

    let (start, end) = match range {
        None => (1, i32::MAX),
        Some(range) => match range.split_once('-') {
            Some((start, end)) => (parse_position(start, query)?, parse_position(end, query)?),
            None => {
                let pos = parse_position(range, query)?;
                (pos, pos)
            }
        },
    };

    if start > end {
        return Err(Error::input(format!("start is after end in query '{}'", query)));
    }

    Ok(Region::new(chromosome, start, end))
}

/// The same chromosome in the other naming convention: `chr1` and `1`,
/// `chrM` and `MT`
pub fn alternate_chromosome_name(name: &str) -> String
{
    match name {
        "MT" => "chrM".to_string(),
        "chrM" => "MT".to_string(),
        name => match name.strip_prefix("chr") {
            Some(stripped) => stripped.to_string(),
            None => format!("chr{}", name),
        },
    }
}

/// Indices to check after a binary search over sorted starts missed.
///
/// `insertion` is where the query start would be inserted into a list of
/// `len` entries. Only the entry before it, which may extend past its own
/// start, and the entry at it can overlap.
pub fn neighbor_candidates(insertion: usize, len: usize) -> impl Iterator<Item = usize>
{
    let before = insertion.checked_sub(1).filter(|i| *i < len);
    let at = Some(insertion).filter(|i| *i < len);
    before.into_iter().chain(at)
}
