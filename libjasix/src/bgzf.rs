//! BGZF, the blocked gzip flavour used by tabix indexed files.
//!
//! Every block is a complete gzip member carrying its own compressed size
//! in a `BC` extra subfield, so a block can be located and inflated without
//! touching the rest of the file.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Seek, SeekFrom, Write},
    path::Path,
};

use libcompression::{BlockCompressor, CompressionConfig};

use crate::{
    error::{CompressionError, Error, Result},
    virtual_position::VirtualPosition,
};

/// Largest compressed block, BSIZE is a u16 holding size - 1
pub const MAX_BGZF_BLOCK_SIZE: usize = 64 * 1024;

/// Uncompressed bytes per written block
pub const BGZF_BLOCK_PAYLOAD: usize = 0xff00;

const HEADER_SIZE: usize = 18;
const TRAILER_SIZE: usize = 8;

pub const BGZF_EOF: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // gzip header with FEXTRA
    6, 0, 66, 67, 2, 0, 27, 0, // BC subfield, BSIZE = 27
    3, 0, // empty deflate block
    0, 0, 0, 0, // CRC32
    0, 0, 0, 0, // ISIZE
];

/// True if `bytes` starts like a BGZF block
pub fn is_bgzf(bytes: &[u8]) -> bool
{
    bytes.len() >= HEADER_SIZE
        && bytes[0] == 31
        && bytes[1] == 139
        && bytes[2] == 8
        && bytes[3] & 4 != 0
        && bytes[12] == b'B'
        && bytes[13] == b'C'
}

fn crc32(bytes: &[u8]) -> u32
{
    let mut crc = flate2::Crc::new();
    crc.update(bytes);
    crc.sum()
}

pub struct BgzfWriter<W: Write, C: BlockCompressor = CompressionConfig>
{
    inner: Option<W>,
    compressor: C,
    block: Vec<u8>,
    file_offset: u64,
}

impl<W: Write> BgzfWriter<W, CompressionConfig>
{
    pub fn new(inner: W) -> Self
    {
        BgzfWriter::with_compressor(inner, CompressionConfig::zlib())
    }
}

impl<W: Write, C: BlockCompressor> BgzfWriter<W, C>
{
    /// `compressor` must produce raw deflate
    pub fn with_compressor(inner: W, compressor: C) -> Self
    {
        BgzfWriter {
            inner: Some(inner),
            compressor,
            block: Vec::with_capacity(BGZF_BLOCK_PAYLOAD),
            file_offset: 0,
        }
    }

    pub fn virtual_position(&self) -> VirtualPosition
    {
        VirtualPosition::new(self.file_offset << 16 | self.block.len() as u64)
    }

    fn write_member(&mut self, data: &[u8]) -> Result<()>
    {
        let deflated = self.compressor.compress(data)?;
        let total = HEADER_SIZE + deflated.len() + TRAILER_SIZE;

        if total > MAX_BGZF_BLOCK_SIZE {
            return Err(CompressionError::Oversized(total).into());
        }

        let mut member = Vec::with_capacity(total);
        member.extend_from_slice(&BGZF_EOF[..16]);
        member.extend_from_slice(&((total - 1) as u16).to_le_bytes());
        member.extend_from_slice(&deflated);
        member.extend_from_slice(&crc32(data).to_le_bytes());
        member.extend_from_slice(&(data.len() as u32).to_le_bytes());

        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| Error::input("write to a finished bgzf writer"))?;
        inner.write_all(&member)?;
        self.file_offset += total as u64;
        Ok(())
    }

    fn emit_block(&mut self) -> Result<()>
    {
        if self.block.is_empty() {
            return Ok(());
        }
        let block = std::mem::replace(&mut self.block, Vec::with_capacity(BGZF_BLOCK_PAYLOAD));
        self.write_member(&block)
    }

    fn finish_inner(&mut self) -> Result<()>
    {
        self.emit_block()?;
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| Error::input("bgzf writer already finished"))?;
        inner.write_all(&BGZF_EOF)?;
        inner.flush()?;
        self.file_offset += BGZF_EOF.len() as u64;
        Ok(())
    }

    /// Emits the open block and the EOF marker
    pub fn finish(mut self) -> Result<W>
    {
        let finished = self.finish_inner();
        let inner = self.inner.take();
        finished?;
        inner.ok_or_else(|| Error::input("bgzf writer already finished"))
    }
}

impl<W: Write, C: BlockCompressor> Write for BgzfWriter<W, C>
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>
    {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let room = BGZF_BLOCK_PAYLOAD - self.block.len();
            let len = room.min(remaining.len());
            self.block.extend_from_slice(&remaining[..len]);
            remaining = &remaining[len..];

            if self.block.len() == BGZF_BLOCK_PAYLOAD {
                self.emit_block().map_err(Error::into_io)?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()>
    {
        self.emit_block().map_err(Error::into_io)?;
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write, C: BlockCompressor> Drop for BgzfWriter<W, C>
{
    fn drop(&mut self)
    {
        if self.inner.is_some() {
            if let Err(e) = self.finish_inner() {
                log::warn!("Unable to finish bgzf stream on drop: {}", e);
            }
        }
    }
}

pub struct BgzfReader<R: Read, C: BlockCompressor = CompressionConfig>
{
    inner: R,
    compressor: C,
    block: Vec<u8>,
    block_offset: usize,
    block_file_offset: u64,
    next_file_offset: u64,
    has_block: bool,
    eof: bool,
}

impl BgzfReader<BufReader<File>, CompressionConfig>
{
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self>
    {
        let file = File::open(path.as_ref())?;
        Ok(BgzfReader::new(BufReader::new(file)))
    }
}

impl<R: Read> BgzfReader<R, CompressionConfig>
{
    pub fn new(inner: R) -> Self
    {
        BgzfReader::with_compressor(inner, CompressionConfig::zlib())
    }
}

impl<R: Read, C: BlockCompressor> BgzfReader<R, C>
{
    pub fn with_compressor(inner: R, compressor: C) -> Self
    {
        BgzfReader {
            inner,
            compressor,
            block: Vec::new(),
            block_offset: 0,
            block_file_offset: 0,
            next_file_offset: 0,
            has_block: false,
            eof: false,
        }
    }

    /// Virtual position of the next unread byte. At the end of a block this
    /// is the start of the next one.
    pub fn virtual_position(&self) -> VirtualPosition
    {
        if self.has_block && self.block_offset < self.block.len() {
            VirtualPosition::new(self.block_file_offset << 16 | self.block_offset as u64)
        } else {
            VirtualPosition::new(self.next_file_offset << 16)
        }
    }

    pub fn into_inner(self) -> R
    {
        self.inner
    }

    /// Reads as much of `buf` as the stream holds, returns the count
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize>
    {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn read_exact_block_bytes(&mut self, buf: &mut [u8]) -> Result<()>
    {
        let found = self.read_up_to(buf)?;
        if found != buf.len() {
            return Err(CompressionError::Truncated {
                expected: buf.len(),
                found,
            }
            .into());
        }
        Ok(())
    }

    /// Loads the block at `next_file_offset`, returns false at the end of
    /// the underlying reader
    fn read_block(&mut self) -> Result<bool>
    {
        self.block_file_offset = self.next_file_offset;
        self.block.clear();
        self.block_offset = 0;
        self.has_block = false;

        let mut fixed = [0u8; 12];
        let found = self.read_up_to(&mut fixed)?;
        if found == 0 {
            self.eof = true;
            return Ok(false);
        }
        if found < fixed.len() {
            return Err(CompressionError::Truncated {
                expected: fixed.len(),
                found,
            }
            .into());
        }

        if fixed[0] != 31 || fixed[1] != 139 || fixed[2] != 8 || fixed[3] & 4 == 0 {
            return Err(CompressionError::BadMagic(fixed[..4].to_vec()).into());
        }

        let xlen = u16::from_le_bytes([fixed[10], fixed[11]]) as usize;
        let mut extra = vec![0u8; xlen];
        self.read_exact_block_bytes(&mut extra)?;

        let mut bsize = None;
        let mut pos = 0;
        while pos + 4 <= xlen {
            let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
            if extra[pos] == b'B' && extra[pos + 1] == b'C' && slen == 2 && pos + 6 <= xlen {
                bsize = Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]) as usize + 1);
                break;
            }
            pos += 4 + slen;
        }

        let block_size = match bsize {
            Some(size) if size >= 12 + xlen + TRAILER_SIZE => size,
            Some(size) => {
                return Err(Error::format(format!("bgzf block size {} is too small", size)))
            }
            None => return Err(CompressionError::BadMagic(extra.clone()).into()),
        };

        let mut rest = vec![0u8; block_size - 12 - xlen];
        self.read_exact_block_bytes(&mut rest)?;

        let (deflated, trailer) = rest.split_at(rest.len() - TRAILER_SIZE);
        let stored_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]) as usize;

        if isize > MAX_BGZF_BLOCK_SIZE {
            return Err(CompressionError::Oversized(isize).into());
        }

        let data = self.compressor.decompress(deflated, isize)?;
        if data.len() != isize {
            return Err(CompressionError::SizeMismatch {
                expected: isize,
                found: data.len(),
            }
            .into());
        }

        let computed = crc32(&data);
        if computed != stored_crc {
            return Err(CompressionError::Checksum {
                stored: stored_crc,
                computed,
            }
            .into());
        }

        self.block = data;
        self.next_file_offset += block_size as u64;
        self.has_block = true;
        Ok(true)
    }

    fn fill_block(&mut self) -> Result<()>
    {
        while !self.eof && (!self.has_block || self.block_offset == self.block.len()) {
            self.read_block()?;
        }
        Ok(())
    }

    /// Reads one line, newline included. Returns the virtual position where
    /// the line starts, or `None` at the end of the stream.
    pub fn read_line_at(&mut self, line: &mut String) -> Result<Option<VirtualPosition>>
    {
        line.clear();
        self.fill_block()?;
        let start = self.virtual_position();
        match self.read_line(line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(start)),
            Err(e) => Err(Error::from_io(e)),
        }
    }
}

impl<R: Read + Seek, C: BlockCompressor> BgzfReader<R, C>
{
    /// Jumps to `position`, inflating the target block only if it is not
    /// the one already loaded
    pub fn seek(&mut self, position: VirtualPosition) -> Result<()>
    {
        let file_offset = position.file_offset();
        let block_offset = position.block_offset() as usize;

        if !self.has_block || file_offset != self.block_file_offset {
            log::debug!("Seeking bgzf stream to {}", position);
            self.inner.seek(SeekFrom::Start(file_offset))?;
            self.next_file_offset = file_offset;
            self.eof = false;
            self.read_block()?;
        }

        if block_offset > self.block.len() {
            return Err(CompressionError::BadBlockOffset {
                offset: block_offset,
                len: self.block.len(),
            }
            .into());
        }
        self.block_offset = block_offset;
        Ok(())
    }
}

impl<R: Read, C: BlockCompressor> Read for BgzfReader<R, C>
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>
    {
        let available = self.fill_buf()?;
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}

impl<R: Read, C: BlockCompressor> BufRead for BgzfReader<R, C>
{
    fn fill_buf(&mut self) -> std::io::Result<&[u8]>
    {
        self.fill_block().map_err(Error::into_io)?;
        Ok(&self.block[self.block_offset..])
    }

    fn consume(&mut self, amt: usize)
    {
        self.block_offset = (self.block_offset + amt).min(self.block.len());
    }
}
