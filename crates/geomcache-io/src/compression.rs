//! Block compressors, one per `BlockCompressionFormat`.
//!
//! The compressor is picked once when the writer is built and passed in as a
//! trait object, so tests can inject their own.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression as FlateCompression;

use geomcache_core::file_format::BlockCompressionFormat;
use geomcache_core::status::{GeomCacheError, StatusResult};

const ZSTD_LEVEL: i32 = 19;

/// Compresses and decompresses whole blocks.
pub trait Compressor: Send {
    fn format(&self) -> BlockCompressionFormat;

    fn compress(&self, data: &[u8]) -> StatusResult<Vec<u8>>;

    /// `uncompressed_size` comes from the block header.
    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> StatusResult<Vec<u8>>;
}

/// Returns the compressor writing `format`.
pub fn compressor_for(format: BlockCompressionFormat) -> Box<dyn Compressor> {
    match format {
        BlockCompressionFormat::Store => Box::new(StoreCompressor),
        BlockCompressionFormat::Deflate => Box::new(DeflateCompressor::default()),
        BlockCompressionFormat::Lz4Hc => Box::new(Lz4HcCompressor),
        BlockCompressionFormat::Zstd => Box::new(ZstdCompressor::default()),
    }
}

fn compression_error(codec: &str, action: &str, err: impl std::fmt::Display) -> GeomCacheError {
    GeomCacheError::Compression(format!("{} {} failed: {}", codec, action, err))
}

/// Blocks are written as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCompressor;

impl Compressor for StoreCompressor {
    fn format(&self) -> BlockCompressionFormat {
        BlockCompressionFormat::Store
    }

    fn compress(&self, data: &[u8]) -> StatusResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], _uncompressed_size: usize) -> StatusResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Raw deflate stream.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: FlateCompression,
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self {
            level: FlateCompression::best(),
        }
    }
}

impl DeflateCompressor {
    pub fn with_level(level: u32) -> Self {
        Self {
            level: FlateCompression::new(level.min(9)),
        }
    }
}

impl Compressor for DeflateCompressor {
    fn format(&self) -> BlockCompressionFormat {
        BlockCompressionFormat::Deflate
    }

    fn compress(&self, data: &[u8]) -> StatusResult<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder
            .write_all(data)
            .map_err(|e| compression_error("Deflate", "compression", e))?;
        encoder
            .finish()
            .map_err(|e| compression_error("Deflate", "finalization", e))
    }

    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> StatusResult<Vec<u8>> {
        let mut decoder = DeflateDecoder::new(data);
        let mut out = Vec::with_capacity(uncompressed_size);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| compression_error("Deflate", "decompression", e))?;
        Ok(out)
    }
}

/// LZ4 block format. `lz4_flex` has no high-compression mode, the output
/// is a plain LZ4 block any LZ4 decoder reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4HcCompressor;

impl Compressor for Lz4HcCompressor {
    fn format(&self) -> BlockCompressionFormat {
        BlockCompressionFormat::Lz4Hc
    }

    fn compress(&self, data: &[u8]) -> StatusResult<Vec<u8>> {
        Ok(lz4_flex::block::compress(data))
    }

    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> StatusResult<Vec<u8>> {
        lz4_flex::block::decompress(data, uncompressed_size).map_err(|e| compression_error("LZ4", "decompression", e))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self { level: ZSTD_LEVEL }
    }
}

impl ZstdCompressor {
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Compressor for ZstdCompressor {
    fn format(&self) -> BlockCompressionFormat {
        BlockCompressionFormat::Zstd
    }

    fn compress(&self, data: &[u8]) -> StatusResult<Vec<u8>> {
        zstd::bulk::compress(data, self.level).map_err(|e| compression_error("Zstd", "compression", e))
    }

    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> StatusResult<Vec<u8>> {
        zstd::bulk::decompress(data, uncompressed_size).map_err(|e| compression_error("Zstd", "decompression", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096u32).map(|i| ((i * 7) % 13) as u8).collect()
    }

    #[test]
    fn test_round_trip_all_formats() {
        let data = sample();
        for format in [
            BlockCompressionFormat::Store,
            BlockCompressionFormat::Deflate,
            BlockCompressionFormat::Lz4Hc,
            BlockCompressionFormat::Zstd,
        ] {
            let compressor = compressor_for(format);
            assert_eq!(compressor.format(), format);
            let compressed = compressor.compress(&data).unwrap();
            if format != BlockCompressionFormat::Store {
                assert!(compressed.len() < data.len(), "{} did not compress", format);
            }
            assert_eq!(compressor.decompress(&compressed, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn test_corrupt_input_is_an_error() {
        let garbage = [0xFFu8; 16];
        for format in [BlockCompressionFormat::Lz4Hc, BlockCompressionFormat::Zstd] {
            let err = compressor_for(format).decompress(&garbage, 1024).unwrap_err();
            assert!(matches!(err, GeomCacheError::Compression(_)));
        }
    }
}
