mod bgzf;
pub mod bins;
mod block_stream;
mod error;
mod interval;
pub mod jasix;
mod parameters;
pub mod prelude;
pub mod tabix;
mod utils;
mod virtual_position;

pub use crate::bgzf::*;
pub use crate::block_stream::*;
pub use crate::error::*;
pub use crate::interval::*;
pub use crate::parameters::*;
pub use crate::utils::*;
pub use crate::virtual_position::*;

pub use libcompression::*;
