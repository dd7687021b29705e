//! Independently compressed blocks, each seekable by its file offset.
//!
//! Layout of a block: a 13 byte little endian header
//! (`u32 magic`, `u8 codec`, `i32 uncompressed size`, `i32 compressed size`)
//! followed by the payload. A compressed size of -1 marks a payload stored
//! as is. A header with both sizes set to -1 terminates the stream.
//!
//! Readers decompress each block with the codec named in its header, so a
//! stream written with any [`CompressionType`] reads back through a reader
//! configured for another.

use std::io::{Read, Seek, SeekFrom, Write};

use libcompression::{BlockCompressor, CompressionConfig, CompressionType, MAX_DECOMPRESS_SIZE};

use crate::error::{CompressionError, Error, Result};

pub const BLOCK_MAGIC: u32 = 0x4B4C4231;
pub const BLOCK_HEADER_SIZE: usize = 13;
pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024 * 1024;

const STORED: i32 = -1;

/// Where a byte lives in a block stream: the file offset of its block and
/// its offset inside the decompressed block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockPosition
{
    pub file_offset: u64,
    pub block_offset: usize,
}

impl BlockPosition
{
    pub const fn new(file_offset: u64, block_offset: usize) -> Self
    {
        Self {
            file_offset,
            block_offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockHeader
{
    codec: CompressionType,
    uncompressed: i32,
    compressed: i32,
}

impl BlockHeader
{
    const EOF: BlockHeader = BlockHeader {
        codec: CompressionType::NONE,
        uncompressed: -1,
        compressed: -1,
    };

    fn is_eof(&self) -> bool
    {
        self.uncompressed == -1 && self.compressed == -1
    }

    fn write_to<W: Write>(&self, mut out_buf: &mut W) -> Result<()>
    {
        let bincode_config = bincode::config::standard().with_fixed_int_encoding();
        bincode::encode_into_std_write(
            (BLOCK_MAGIC, self.codec.to_byte(), self.uncompressed, self.compressed),
            &mut out_buf,
            bincode_config,
        )?;
        Ok(())
    }

    /// `Ok(None)` when the stream ends cleanly before a header
    fn read_from<R: Read>(in_buf: &mut R) -> Result<Option<Self>>
    {
        let mut raw = [0u8; BLOCK_HEADER_SIZE];
        let mut filled = 0;
        while filled < BLOCK_HEADER_SIZE {
            match in_buf.read(&mut raw[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < BLOCK_HEADER_SIZE {
            return Err(CompressionError::Truncated {
                expected: BLOCK_HEADER_SIZE,
                found: filled,
            }
            .into());
        }

        let bincode_config = bincode::config::standard().with_fixed_int_encoding();
        let ((magic, codec, uncompressed, compressed), _): ((u32, u8, i32, i32), usize) =
            bincode::decode_from_slice(&raw, bincode_config)?;

        if magic != BLOCK_MAGIC {
            return Err(CompressionError::BadMagic(raw[..4].to_vec()).into());
        }

        let codec = CompressionType::from_byte(codec).ok_or(CompressionError::UnknownCodec(codec))?;
        let header = BlockHeader {
            codec,
            uncompressed,
            compressed,
        };

        if !header.is_eof()
            && (uncompressed < 0 || compressed < STORED)
        {
            return Err(Error::format(format!(
                "invalid block sizes {} / {}",
                uncompressed, compressed
            )));
        }

        Ok(Some(header))
    }
}

/// Buffers writes into fixed size blocks and emits each block compressed
/// on its own
pub struct BlockWriter<W: Write, C: BlockCompressor = CompressionConfig>
{
    inner: Option<W>,
    compressor: C,
    block: Vec<u8>,
    block_size: usize,
    file_offset: u64,
    blocks_written: usize,
}

impl<W: Write> BlockWriter<W, CompressionConfig>
{
    pub fn new(inner: W) -> Self
    {
        BlockWriter::with_compressor(inner, CompressionConfig::default())
    }
}

impl<W: Write, C: BlockCompressor> BlockWriter<W, C>
{
    pub fn with_compressor(inner: W, compressor: C) -> Self
    {
        BlockWriter {
            inner: Some(inner),
            compressor,
            block: Vec::new(),
            block_size: DEFAULT_BLOCK_SIZE,
            file_offset: 0,
            blocks_written: 0,
        }
    }

    /// Clamped to [1, 1 GiB]
    pub fn with_block_size(mut self, block_size: usize) -> Self
    {
        self.block_size = block_size.clamp(1, MAX_DECOMPRESS_SIZE);
        self
    }

    pub fn block_size(&self) -> usize
    {
        self.block_size
    }

    pub fn blocks_written(&self) -> usize
    {
        self.blocks_written
    }

    /// Position the next written byte will have
    pub fn position(&self) -> BlockPosition
    {
        BlockPosition::new(self.file_offset, self.block.len())
    }

    fn inner_mut(&mut self) -> std::io::Result<&mut W>
    {
        self.inner.as_mut().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "block writer already finished",
            )
        })
    }

    fn emit_block(&mut self) -> Result<()>
    {
        if self.block.is_empty() {
            return Ok(());
        }

        let compressed = self.compressor.compress(&self.block)?;

        let (header, payload) = if compressed.len() >= self.block.len() {
            (
                BlockHeader {
                    codec: CompressionType::NONE,
                    uncompressed: self.block.len() as i32,
                    compressed: STORED,
                },
                &self.block,
            )
        } else {
            (
                BlockHeader {
                    codec: self.compressor.compression_type(),
                    uncompressed: self.block.len() as i32,
                    compressed: compressed.len() as i32,
                },
                &compressed,
            )
        };

        let inner = self.inner.as_mut().ok_or_else(|| {
            Error::input("write to a block writer that was already finished")
        })?;
        header.write_to(inner)?;
        inner.write_all(payload)?;

        log::debug!(
            "Block {} at offset {}: {} bytes -> {} bytes",
            self.blocks_written,
            self.file_offset,
            self.block.len(),
            payload.len()
        );

        self.file_offset += (BLOCK_HEADER_SIZE + payload.len()) as u64;
        self.blocks_written += 1;
        self.block.clear();
        Ok(())
    }

    fn finish_inner(&mut self) -> Result<()>
    {
        self.emit_block()?;
        let inner = self.inner_mut()?;
        BlockHeader::EOF.write_to(inner)?;
        inner.flush()?;
        self.file_offset += BLOCK_HEADER_SIZE as u64;
        Ok(())
    }

    /// Emits the open block and the EOF marker, returning the inner writer
    pub fn finish(mut self) -> Result<W>
    {
        let finished = self.finish_inner();
        let inner = self.inner.take();
        finished?;
        inner.ok_or_else(|| Error::input("block writer already finished"))
    }
}

impl<W: Write, C: BlockCompressor> Write for BlockWriter<W, C>
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>
    {
        if self.block.capacity() == 0 {
            self.block.reserve(self.block_size.min(buf.len().max(8192)));
        }

        let mut written = 0;
        while written < buf.len() {
            let room = self.block_size - self.block.len();
            let len = room.min(buf.len() - written);
            self.block.extend_from_slice(&buf[written..written + len]);
            written += len;

            if self.block.len() == self.block_size {
                self.emit_block().map_err(Error::into_io)?;
            }
        }
        Ok(written)
    }

    /// Emits the open block, even if it is not full
    fn flush(&mut self) -> std::io::Result<()>
    {
        self.emit_block().map_err(Error::into_io)?;
        self.inner_mut()?.flush()
    }
}

impl<W: Write, C: BlockCompressor> Drop for BlockWriter<W, C>
{
    fn drop(&mut self)
    {
        if self.inner.is_some() {
            if let Err(e) = self.finish_inner() {
                log::warn!("Unable to finish block stream on drop: {}", e);
            }
        }
    }
}

/// Reads a block stream written by [`BlockWriter`]
pub struct BlockReader<R: Read, C: BlockCompressor = CompressionConfig>
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

impl<R: Read> BlockReader<R, CompressionConfig>
{
    pub fn new(inner: R) -> Self
    {
        BlockReader::with_compressor(inner, CompressionConfig::default())
    }
}

impl<R: Read, C: BlockCompressor> BlockReader<R, C>
{
    pub fn with_compressor(inner: R, compressor: C) -> Self
    {
        BlockReader {
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

    /// Position of the next byte to be read. Once a block is exhausted
    /// this is the start of the following block, matching what the writer
    /// reported when the byte was written.
    pub fn position(&self) -> BlockPosition
    {
        if self.has_block && self.block_offset < self.block.len() {
            BlockPosition::new(self.block_file_offset, self.block_offset)
        } else {
            BlockPosition::new(self.next_file_offset, 0)
        }
    }

    pub fn is_eof(&self) -> bool
    {
        self.eof
    }

    pub fn into_inner(self) -> R
    {
        self.inner
    }

    /// Loads the block at `next_file_offset`. Returns false on the EOF block
    /// or at the end of the underlying reader.
    fn read_block(&mut self) -> Result<bool>
    {
        self.block_file_offset = self.next_file_offset;
        self.block.clear();
        self.block_offset = 0;
        self.has_block = false;

        let header = match BlockHeader::read_from(&mut self.inner)? {
            Some(header) if header.is_eof() => {
                self.eof = true;
                self.next_file_offset += BLOCK_HEADER_SIZE as u64;
                return Ok(false);
            }
            Some(header) => header,
            None => {
                log::warn!("Block stream ended without an EOF block");
                self.eof = true;
                return Ok(false);
            }
        };

        let uncompressed = header.uncompressed as usize;
        let payload_len = if header.compressed == STORED {
            uncompressed
        } else {
            header.compressed as usize
        };

        let mut payload = Vec::with_capacity(payload_len);
        (&mut self.inner)
            .take(payload_len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != payload_len {
            return Err(CompressionError::Truncated {
                expected: payload_len,
                found: payload.len(),
            }
            .into());
        }

        self.block = if header.compressed == STORED {
            payload
        } else if header.codec == self.compressor.compression_type() {
            self.compressor.decompress(&payload, uncompressed)?
        } else {
            log::debug!("Block at {} is {:?} compressed", self.block_file_offset, header.codec);
            CompressionConfig::new()
                .with_compression_type(header.codec)
                .decompress(&payload, uncompressed)?
        };

        if self.block.len() != uncompressed {
            return Err(CompressionError::SizeMismatch {
                expected: uncompressed,
                found: self.block.len(),
            }
            .into());
        }

        log::debug!(
            "Read block at {}: {} bytes",
            self.block_file_offset,
            uncompressed
        );

        self.next_file_offset += (BLOCK_HEADER_SIZE + payload_len) as u64;
        self.has_block = true;
        Ok(true)
    }

    /// Make sure there are unread bytes in the current block, unless the
    /// stream is over
    fn fill_block(&mut self) -> Result<()>
    {
        while !self.eof && (!self.has_block || self.block_offset == self.block.len()) {
            self.read_block()?;
        }
        Ok(())
    }

    /// Reads until `buf` is full or the stream ends
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<usize>
    {
        let mut read = 0;
        while read < buf.len() {
            self.fill_block()?;
            if self.eof && (!self.has_block || self.block_offset == self.block.len()) {
                break;
            }
            let available = &self.block[self.block_offset..];
            let len = available.len().min(buf.len() - read);
            buf[read..read + len].copy_from_slice(&available[..len]);
            self.block_offset += len;
            read += len;
        }
        Ok(read)
    }
}

impl<R: Read + Seek, C: BlockCompressor> BlockReader<R, C>
{
    /// Jumps to `position`, decompressing the target block only if it is
    /// not the one already loaded
    pub fn set_position(&mut self, position: BlockPosition) -> Result<()>
    {
        if !self.has_block || position.file_offset != self.block_file_offset {
            self.inner.seek(SeekFrom::Start(position.file_offset))?;
            self.next_file_offset = position.file_offset;
            self.eof = false;
            self.read_block()?;
        }

        if position.block_offset > self.block.len() {
            return Err(CompressionError::BadBlockOffset {
                offset: position.block_offset,
                len: self.block.len(),
            }
            .into());
        }

        self.block_offset = position.block_offset;
        Ok(())
    }
}

impl<R: Read, C: BlockCompressor> Read for BlockReader<R, C>
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>
    {
        self.read_fully(buf).map_err(Error::into_io)
    }
}
