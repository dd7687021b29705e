pub use crate::{
    bgzf::{BgzfReader, BgzfWriter},
    block_stream::{BlockPosition, BlockReader, BlockWriter},
    error::{Error, ErrorKind, Result},
    jasix::{IndexCreator, JasixIndex, JasixIndexBuilder, QueryProcessor},
    parameters::Parameters,
    tabix::TabixIndex,
    utils::{parse_query, Region},
    virtual_position::VirtualPosition,
};
pub use libcompression::*;
