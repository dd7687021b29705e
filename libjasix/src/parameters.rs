use std::path::Path;

use serde::{Deserialize, Serialize};

use libcompression::{default_compression_level, CompressionConfig, CompressionType};

use crate::{block_stream::DEFAULT_BLOCK_SIZE, error::Result};

/// Build time settings. Queries do not depend on them, so they are not
/// stored in the index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Parameters
{
    /// Records spanning more bases than this are large variants
    pub large_variant_threshold: i32,
    pub max_node_width: i32,
    pub preferred_node_count: usize,
    /// Uncompressed size of a block stream block
    pub block_size: usize,
    pub compression: CompressionConfig,
}

impl Default for Parameters
{
    fn default() -> Self
    {
        Parameters {
            large_variant_threshold: 50,
            max_node_width: 50,
            preferred_node_count: 50,
            block_size: DEFAULT_BLOCK_SIZE,
            compression: CompressionConfig::default(),
        }
    }
}

impl Parameters
{
    pub fn from_yaml(yaml: &str) -> Result<Self>
    {
        Ok(serde_yml::from_str(yaml)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self>
    {
        let yaml = std::fs::read_to_string(path)?;
        Parameters::from_yaml(&yaml)
    }

    pub fn with_large_variant_threshold(mut self, threshold: i32) -> Self
    {
        self.large_variant_threshold = threshold;
        self
    }

    pub fn with_max_node_width(mut self, width: i32) -> Self
    {
        self.max_node_width = width;
        self
    }

    pub fn with_preferred_node_count(mut self, count: usize) -> Self
    {
        self.preferred_node_count = count;
        self
    }

    /// Switching codec resets the level to that codec's default
    pub fn with_compression_type(mut self, compression_type: CompressionType) -> Self
    {
        if compression_type != self.compression.compression_type {
            self.compression = self
                .compression
                .with_compression_type(compression_type)
                .with_compression_level(default_compression_level(compression_type));
        }
        self
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn bundled_profile_is_the_default()
    {
        let params =
            Parameters::from_yaml(include_str!("../profiles/default.yaml")).unwrap();
        assert_eq!(params, Parameters::default());
    }

    #[test]
    fn missing_fields_keep_defaults()
    {
        let params = Parameters::from_yaml(
            "max_node_width: 100\ncompression:\n  compression_type: ZLIB\n  compression_level: 6\n",
        )
        .unwrap();
        assert_eq!(params.max_node_width, 100);
        assert_eq!(params.large_variant_threshold, 50);
        assert_eq!(params.compression.compression_type, CompressionType::ZLIB);
    }

    #[test]
    fn changing_codec_resets_the_level()
    {
        let params = Parameters::default().with_compression_type(CompressionType::ZLIB);
        assert_eq!(params.compression.compression_type, CompressionType::ZLIB);
        assert_eq!(params.compression.compression_level, 6);

        let mut tuned = Parameters::default();
        tuned.compression.compression_level = 19;
        let same = tuned.clone().with_compression_type(CompressionType::ZSTD);
        assert_eq!(same, tuned);
    }

    #[test]
    fn malformed_yaml_is_an_input_error()
    {
        let err = Parameters::from_yaml("max_node_width: [1, 2").unwrap_err();
        assert!(err.is_input_error());
    }
}
