use std::io::{Seek, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use geomcache_core::file_format::{BlockCompressionFormat, COMPRESSED_BLOCK_HEADER_SIZE};
use geomcache_core::status::{GeomCacheError, StatusResult};

use crate::compression::Compressor;
use crate::disk_writer::DiskWriter;

/// Where a block landed in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub offset: u64,
    /// Bytes on disk, including the compression header.
    pub size: u32,
    pub uncompressed_size: u32,
}

/// Writes whole logical blocks, compressed in one piece.
pub struct BlockWriter {
    compressor: Box<dyn Compressor>,
}

impl BlockWriter {
    pub fn new(compressor: Box<dyn Compressor>) -> Self {
        Self { compressor }
    }

    pub fn format(&self) -> BlockCompressionFormat {
        self.compressor.format()
    }

    /// Compresses `data` and appends it to `disk` as one block.
    pub fn write_block<W: Write + Seek>(&self, data: &[u8], disk: &mut DiskWriter<W>) -> StatusResult<BlockInfo> {
        let block = encode_block(self.compressor.as_ref(), data)?;
        let offset = disk.write(&block, None)?;
        Ok(BlockInfo {
            offset,
            size: block_size(block.len())?,
            uncompressed_size: block_size(data.len())?,
        })
    }
}

/// On-disk bytes of one block: raw for store, otherwise
/// `uncompressed_size u32, compressed_size u32, data`.
pub fn encode_block(compressor: &dyn Compressor, data: &[u8]) -> StatusResult<Vec<u8>> {
    let uncompressed_size = block_size(data.len())?;

    if compressor.format() == BlockCompressionFormat::Store {
        return Ok(data.to_vec());
    }

    let compressed = compressor.compress(data)?;
    if compressed.is_empty() {
        return Err(GeomCacheError::Compression(format!(
            "{} produced no output for a {} byte block",
            compressor.format(),
            data.len()
        )));
    }
    let compressed_size = block_size(compressed.len())?;

    let mut out = Vec::with_capacity(COMPRESSED_BLOCK_HEADER_SIZE + compressed.len());
    out.write_u32::<LittleEndian>(uncompressed_size)?;
    out.write_u32::<LittleEndian>(compressed_size)?;
    out.extend_from_slice(&compressed);
    Ok(out)
}

fn block_size(len: usize) -> StatusResult<u32> {
    u32::try_from(len).map_err(|_| GeomCacheError::InvalidParameter(format!("block of {} bytes exceeds 4 GiB", len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{compressor_for, StoreCompressor};
    use std::io::Cursor;

    struct EmptyOutput;

    impl Compressor for EmptyOutput {
        fn format(&self) -> BlockCompressionFormat {
            BlockCompressionFormat::Zstd
        }
        fn compress(&self, _data: &[u8]) -> StatusResult<Vec<u8>> {
            Ok(Vec::new())
        }
        fn decompress(&self, _data: &[u8], _size: usize) -> StatusResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    struct Failing;

    impl Compressor for Failing {
        fn format(&self) -> BlockCompressionFormat {
            BlockCompressionFormat::Deflate
        }
        fn compress(&self, _data: &[u8]) -> StatusResult<Vec<u8>> {
            Err(GeomCacheError::Compression("boom".to_string()))
        }
        fn decompress(&self, _data: &[u8], _size: usize) -> StatusResult<Vec<u8>> {
            Err(GeomCacheError::Compression("boom".to_string()))
        }
    }

    #[test]
    fn test_compressed_block_header() {
        let compressor = compressor_for(BlockCompressionFormat::Deflate);
        let data = vec![5u8; 1000];
        let block = encode_block(compressor.as_ref(), &data).unwrap();
        let uncompressed = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        let compressed = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        assert_eq!(uncompressed, 1000);
        assert_eq!(compressed as usize, block.len() - COMPRESSED_BLOCK_HEADER_SIZE);
        assert_eq!(compressor.decompress(&block[8..], 1000).unwrap(), data);
    }

    #[test]
    fn test_store_block_is_raw() {
        let block = encode_block(&StoreCompressor, &[1, 2, 3]).unwrap();
        assert_eq!(block, vec![1, 2, 3]);
    }

    #[test]
    fn test_compressor_failures_are_hard_errors() {
        assert!(matches!(
            encode_block(&EmptyOutput, &[1, 2, 3]),
            Err(GeomCacheError::Compression(_))
        ));
        assert!(matches!(encode_block(&Failing, &[1]), Err(GeomCacheError::Compression(_))));
    }

    #[test]
    fn test_write_block_records_offset() {
        let mut disk = DiskWriter::new(Cursor::new(Vec::new())).unwrap();
        disk.write(&[0; 16], None).unwrap();

        let writer = BlockWriter::new(compressor_for(BlockCompressionFormat::Zstd));
        let info = writer.write_block(&[7; 256], &mut disk).unwrap();
        assert_eq!(info.offset, 16);
        assert_eq!(info.uncompressed_size, 256);
        assert_eq!(disk.position(), 16 + info.size as u64);

        let next = writer.write_block(&[1; 8], &mut disk).unwrap();
        assert_eq!(next.offset, 16 + info.size as u64);
    }
}
