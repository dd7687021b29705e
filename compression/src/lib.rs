use std::{
    cell::RefCell,
    io::{Read, Write},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

pub const MAX_DECOMPRESS_SIZE: usize = 1024 * 1024 * 1024; // 1GB

thread_local! {
    static ZSTD_COMPRESSOR: RefCell<Option<zstd::bulk::Compressor<'static>>> = const { RefCell::new(None) };
    static ZSTD_DECOMPRESSOR: RefCell<Option<zstd::bulk::Decompressor<'static>>> = const { RefCell::new(None) };
}

/// Compression strategy injected into the block containers.
///
/// Every block is compressed on its own, so implementations must not
/// carry state from one call to the next.
pub trait BlockCompressor
{
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error>;

    /// `uncompressed_len` is the size recorded alongside the block. It is
    /// used as the output capacity, decompressing to more than that is an
    /// error.
    fn decompress(
        &self,
        bytes: &[u8],
        uncompressed_len: usize,
    ) -> Result<Vec<u8>, std::io::Error>;

    /// Worst case size of `len` bytes once compressed
    fn bounded_compressed_size(&self, len: usize) -> usize;

    /// Codec recorded next to each block so readers can pick a matching
    /// decompressor
    fn compression_type(&self) -> CompressionType;
}

impl<T: BlockCompressor + ?Sized> BlockCompressor for &T
{
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error>
    {
        (**self).compress(bytes)
    }

    fn decompress(
        &self,
        bytes: &[u8],
        uncompressed_len: usize,
    ) -> Result<Vec<u8>, std::io::Error>
    {
        (**self).decompress(bytes, uncompressed_len)
    }

    fn bounded_compressed_size(&self, len: usize) -> usize
    {
        (**self).bounded_compressed_size(len)
    }

    fn compression_type(&self) -> CompressionType
    {
        (**self).compression_type()
    }
}

impl<T: BlockCompressor + ?Sized> BlockCompressor for Arc<T>
{
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error>
    {
        (**self).compress(bytes)
    }

    fn decompress(
        &self,
        bytes: &[u8],
        uncompressed_len: usize,
    ) -> Result<Vec<u8>, std::io::Error>
    {
        (**self).decompress(bytes, uncompressed_len)
    }

    fn bounded_compressed_size(&self, len: usize) -> usize
    {
        (**self).bounded_compressed_size(len)
    }

    fn compression_type(&self) -> CompressionType
    {
        (**self).compression_type()
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct CompressionConfig
{
    pub compression_type: CompressionType,
    pub compression_level: i8,
}

impl Default for CompressionConfig
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl CompressionConfig
{
    pub const fn new() -> Self
    {
        Self {
            compression_type: CompressionType::ZSTD,
            compression_level: 3,
        }
    }

    /// Raw deflate, the payload format of BGZF blocks
    pub const fn zlib() -> Self
    {
        Self {
            compression_type: CompressionType::ZLIB,
            compression_level: default_compression_level(CompressionType::ZLIB),
        }
    }

    pub const fn with_compression_type(
        mut self,
        compression_type: CompressionType,
    ) -> Self
    {
        self.compression_type = compression_type;
        self
    }

    pub const fn with_compression_level(mut self, compression_level: i8) -> Self
    {
        self.compression_level = compression_level;
        self
    }

    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error>
    {
        match self.compression_type {
            CompressionType::ZSTD => {
                let level = self.compression_level as i32;
                ZSTD_COMPRESSOR.with_borrow_mut(|slot| {
                    let compressor = match slot.take() {
                        Some(compressor) => compressor,
                        None => zstd_encoder(level)?,
                    };
                    let compressor = slot.insert(compressor);
                    compressor.set_compression_level(level)?;
                    compressor.compress(bytes)
                })
            }
            CompressionType::ZLIB => {
                let level = self.compression_level.clamp(0, 9) as u32;
                let mut encoder = flate2::write::DeflateEncoder::new(
                    Vec::with_capacity(bytes.len() / 2),
                    flate2::Compression::new(level),
                );
                encoder.write_all(bytes)?;
                encoder.finish()
            }
            CompressionType::NONE => {
                log::debug!("Compress called for none, which involves copying bytes");
                Ok(bytes.to_vec())
            }
        }
    }

    pub fn decompress(
        &self,
        bytes: &[u8],
        uncompressed_len: usize,
    ) -> Result<Vec<u8>, std::io::Error>
    {
        if uncompressed_len > MAX_DECOMPRESS_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Refusing to decompress {} bytes, the limit is {}",
                    uncompressed_len, MAX_DECOMPRESS_SIZE
                ),
            ));
        }

        match self.compression_type {
            CompressionType::ZSTD => ZSTD_DECOMPRESSOR.with_borrow_mut(|slot| {
                let decompressor = match slot.take() {
                    Some(decompressor) => decompressor,
                    None => zstd_decompressor()?,
                };
                let decompressor = slot.insert(decompressor);
                decompressor.decompress(bytes, uncompressed_len)
            }),
            CompressionType::ZLIB => {
                let mut output = Vec::with_capacity(uncompressed_len);
                // One byte past the expected size so callers can see an
                // oversized block instead of a silently truncated one
                flate2::read::DeflateDecoder::new(bytes)
                    .take(uncompressed_len as u64 + 1)
                    .read_to_end(&mut output)?;
                Ok(output)
            }
            CompressionType::NONE => {
                log::debug!("Decompress called for none, which involves copying bytes");
                Ok(bytes.to_vec())
            }
        }
    }

    pub fn bounded_compressed_size(&self, len: usize) -> usize
    {
        match self.compression_type {
            CompressionType::ZSTD => zstd::zstd_safe::compress_bound(len),
            // zlib's compressBound
            CompressionType::ZLIB => {
                len + (len >> 12) + (len >> 14) + (len >> 25) + 13
            }
            CompressionType::NONE => len,
        }
    }
}

impl BlockCompressor for CompressionConfig
{
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error>
    {
        CompressionConfig::compress(self, bytes)
    }

    fn decompress(
        &self,
        bytes: &[u8],
        uncompressed_len: usize,
    ) -> Result<Vec<u8>, std::io::Error>
    {
        CompressionConfig::decompress(self, bytes, uncompressed_len)
    }

    fn bounded_compressed_size(&self, len: usize) -> usize
    {
        CompressionConfig::bounded_compressed_size(self, len)
    }

    fn compression_type(&self) -> CompressionType
    {
        self.compression_type
    }
}

#[derive(
    PartialEq,
    Eq,
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub enum CompressionType
{
    #[default]
    ZSTD, // 3 should be default compression ratio
    ZLIB, // Raw deflate, 6 is default
    NONE, // No Compression
}

impl CompressionType
{
    /// One byte tag for on-disk headers
    pub const fn to_byte(self) -> u8
    {
        match self {
            CompressionType::NONE => 0,
            CompressionType::ZSTD => 1,
            CompressionType::ZLIB => 2,
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self>
    {
        match byte {
            0 => Some(CompressionType::NONE),
            1 => Some(CompressionType::ZSTD),
            2 => Some(CompressionType::ZLIB),
            _ => None,
        }
    }
}

pub const fn default_compression_level(ct: CompressionType) -> i8
{
    match ct {
        CompressionType::ZSTD => 3,
        CompressionType::ZLIB => 6,
        CompressionType::NONE => 0,
    }
}

pub fn zstd_encoder(
    compression_level: i32,
) -> Result<zstd::bulk::Compressor<'static>, std::io::Error>
{
    let mut encoder = zstd::bulk::Compressor::new(compression_level)?;
    encoder.include_checksum(false)?;
    Ok(encoder)
}

pub fn zstd_decompressor<'a>(
) -> Result<zstd::bulk::Decompressor<'a>, std::io::Error>
{
    zstd::bulk::Decompressor::new()
}

#[cfg(test)]
mod tests
{
    use super::*;
    use rand::prelude::*;

    fn text_block() -> Vec<u8>
    {
        let mut data = Vec::new();
        for i in 0..2000 {
            data.extend_from_slice(
                format!("chr1\t{}\t.\tA\tG\t50\tPASS\t.\n", 10_000 + i * 7)
                    .as_bytes(),
            );
        }
        data
    }

    #[test]
    fn zstd_and_zlib_shrink_text()
    {
        let data = text_block();

        for config in [CompressionConfig::new(), CompressionConfig::zlib()] {
            let compressed = config.compress(&data).unwrap();
            assert!(compressed.len() < data.len());
            let decompressed =
                config.decompress(&compressed, data.len()).unwrap();
            assert_eq!(decompressed, data);
        }
    }

    #[test]
    fn none_is_passthrough()
    {
        let config =
            CompressionConfig::new().with_compression_type(CompressionType::NONE);
        let data = b"no compression here".to_vec();
        assert_eq!(config.compress(&data).unwrap(), data);
        assert_eq!(config.bounded_compressed_size(data.len()), data.len());
    }

    #[test]
    fn bound_covers_incompressible_input()
    {
        let mut rng = StdRng::seed_from_u64(42);
        let mut data = vec![0u8; 64 * 1024];
        rng.fill_bytes(&mut data);

        for config in [CompressionConfig::new(), CompressionConfig::zlib()] {
            let compressed = config.compress(&data).unwrap();
            assert!(compressed.len() <= config.bounded_compressed_size(data.len()));
        }
    }

    #[test]
    fn zlib_oversized_block_is_visible()
    {
        let config = CompressionConfig::zlib();
        let data = text_block();
        let compressed = config.compress(&data).unwrap();
        let decompressed = config.decompress(&compressed, 100).unwrap();
        assert_eq!(decompressed.len(), 101);
    }

    #[test]
    fn header_tags_are_distinct()
    {
        for ct in [CompressionType::ZSTD, CompressionType::ZLIB, CompressionType::NONE] {
            assert_eq!(CompressionType::from_byte(ct.to_byte()), Some(ct));
            assert_eq!(BlockCompressor::compression_type(&CompressionConfig::new().with_compression_type(ct)), ct);
        }
        assert_eq!(CompressionType::from_byte(3), None);
    }

    #[test]
    fn parse_config_from_yaml()
    {
        let config: CompressionConfig = serde_yml::from_str(
            "compression_type: ZLIB\ncompression_level: 9\n",
        )
        .unwrap();
        assert_eq!(config.compression_type, CompressionType::ZLIB);
        assert_eq!(config.compression_level, 9);
    }
}
