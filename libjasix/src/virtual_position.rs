use std::fmt;

/// Largest in-block offset a virtual position can carry
pub const MAX_BLOCK_OFFSET: u64 = 0xFFFF;

/// Packed (compressed block file offset, in-block offset) pair.
///
/// The upper 48 bits are the file offset of the start of a compressed block,
/// the lower 16 bits the offset into that block once decompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualPosition(u64);

impl VirtualPosition
{
    pub const fn new(value: u64) -> Self
    {
        VirtualPosition(value)
    }

    /// Returns `None` if `block_offset` does not fit into 16 bits or
    /// `file_offset` into 48
    pub fn from_parts(file_offset: u64, block_offset: u64) -> Option<Self>
    {
        if block_offset > MAX_BLOCK_OFFSET || file_offset >> 48 != 0 {
            return None;
        }
        Some(VirtualPosition(file_offset << 16 | block_offset))
    }

    pub const fn file_offset(&self) -> u64
    {
        self.0 >> 16
    }

    pub const fn block_offset(&self) -> u64
    {
        self.0 & MAX_BLOCK_OFFSET
    }

    pub const fn value(&self) -> u64
    {
        self.0
    }
}

/// Splits a raw virtual position into (file offset, block offset)
pub const fn unpack(value: u64) -> (u64, u64)
{
    (value >> 16, value & MAX_BLOCK_OFFSET)
}

impl From<u64> for VirtualPosition
{
    fn from(value: u64) -> Self
    {
        VirtualPosition(value)
    }
}

impl From<VirtualPosition> for u64
{
    fn from(vp: VirtualPosition) -> Self
    {
        vp.0
    }
}

impl fmt::Display for VirtualPosition
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}:{}", self.file_offset(), self.block_offset())
    }
}
