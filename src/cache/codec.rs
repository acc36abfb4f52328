//! Payload Codec Module
//!
//! Compression strategies applied to serialized values before they are stored.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;

// == Compressor Trait ==
/// Encode/decode pair applied to payloads.
///
/// Capacity accounting never looks at compressed sizes, so any algorithm can
/// be swapped in without changing eviction behavior.
pub trait Compressor: Send + Sync {
    /// Compresses raw bytes.
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>>;

    /// Restores bytes produced by [`Compressor::compress`].
    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>>;
}

// == Gzip ==
/// Gzip compression backed by flate2.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    /// Creates a compressor with the given level (0-9).
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::fast(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed);
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw)?;
        Ok(raw)
    }
}

// == Passthrough ==
/// Stores payloads as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    #[test]
    fn test_gzip_shrinks_repetitive_payloads() {
        let raw = br#"{"title":"note","body":"lorem ipsum "}"#.repeat(200);
        let gzip = GzipCompressor::default();

        let compressed = gzip.compress(&raw).unwrap();
        assert!(compressed.len() < raw.len());
        assert_eq!(gzip.decompress(&compressed).unwrap(), raw);
    }

    #[test]
    fn test_gzip_empty_input() {
        let gzip = GzipCompressor::new(9);
        let compressed = gzip.compress(b"").unwrap();
        assert!(gzip.decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_gzip_rejects_garbage() {
        let result = GzipCompressor::default().decompress(b"definitely not gzip");
        assert!(matches!(result, Err(CacheError::Codec(_))));
    }

    #[test]
    fn test_no_compression_is_identity() {
        let raw = b"plain".to_vec();
        assert_eq!(NoCompression.compress(&raw).unwrap(), raw);
        assert_eq!(NoCompression.decompress(&raw).unwrap(), raw);
    }
}
