//! Native index over the annotation json output.
//!
//! Records are grouped into nodes during one sorted pass, so the index
//! grows with the number of nodes rather than records. Records spanning
//! more than the large variant threshold are also kept verbatim for
//! overlap queries.

mod chr_index;
mod creator;
mod index;
pub mod json;
mod node;
mod query;

pub use chr_index::*;
pub use creator::*;
pub use index::*;
pub use node::*;
pub use query::*;

pub const VERSION: i32 = 1;
pub const FILE_EXT: &str = ".jsi";

pub const HEADER_SECTION_TAG: &str = "header";
pub const POSITIONS_SECTION_TAG: &str = "positions";
pub const GENES_SECTION_TAG: &str = "genes";
