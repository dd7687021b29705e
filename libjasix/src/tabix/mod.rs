//! Reader, writer and region search for tabix (`.tbi`) indexes.

mod index;
mod search;

pub use index::*;
pub use search::*;

/// `TBI\x01`
pub const TABIX_MAGIC: [u8; 4] = [b'T', b'B', b'I', 1];

pub const FORMAT_VCF: i32 = 2;

/// Set in the format flags when positions in the file are 0-based
pub const FORMAT_ZERO_BASED: i32 = 0x10000;

/// htslib stores per reference read counts under this pseudo bin
pub const METADATA_BIN: u32 = 37450;
