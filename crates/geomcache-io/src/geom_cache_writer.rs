//! File format assembler.
//!
//! Layout: header, frame table, static data block, one block per frame.
//! Header and frame table are written as placeholders first (zero
//! signature, zeroed entries) and patched in place by `finish`, since frame
//! offsets are only known after the frames are written.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use log::info;

use geomcache_core::encoder_buffer::EncoderBuffer;
use geomcache_core::encoder_options::EncoderOptions;
use geomcache_core::file_format::{
    FrameType, FILE_SIGNATURE, FILE_VERSION, FRAME_INFO_SIZE, HEADER_FLAG_32BIT_INDICES,
    HEADER_FLAG_PLAYBACK_FROM_MEMORY, HEADER_SIZE,
};
use geomcache_core::status::{GeomCacheError, Status, StatusResult};
use geomcache_core::vector_extensions::Aabb;

use crate::block_writer::BlockWriter;
use crate::compression::{compressor_for, Compressor};
use crate::disk_writer::DiskWriter;
use crate::traits::{EncodedFrame, FrameSink, WriterStats};

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameTableEntry {
    offset: u64,
    size: u32,
    frame_type: FrameType,
    time: f32,
}

pub struct GeomCacheWriter<W: Write + Seek> {
    disk: DiskWriter<W>,
    block_writer: BlockWriter,
    flags: u32,
    num_frames: u32,
    frame_table: Vec<FrameTableEntry>,
    aabb: Aabb,
    static_data_size: u64,
    animation_data_size: u64,
    uncompressed_animation_size: u64,
    static_data_written: bool,
}

impl GeomCacheWriter<BufWriter<File>> {
    /// Creates (or truncates) `path` and reserves header and frame table.
    pub fn create<P: AsRef<Path>>(path: P, options: &EncoderOptions, num_frames: u32) -> StatusResult<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), options, num_frames)
    }
}

impl<W: Write + Seek> GeomCacheWriter<W> {
    pub fn new(inner: W, options: &EncoderOptions, num_frames: u32) -> StatusResult<Self> {
        Self::with_compressor(inner, options, num_frames, compressor_for(options.block_compression_format()))
    }

    /// Like `new`, with an explicit block compressor.
    pub fn with_compressor(
        inner: W,
        options: &EncoderOptions,
        num_frames: u32,
        compressor: Box<dyn Compressor>,
    ) -> StatusResult<Self> {
        let mut flags = 0;
        if options.playback_from_memory() {
            flags |= HEADER_FLAG_PLAYBACK_FROM_MEMORY;
        }
        if options.use_32bit_indices() {
            flags |= HEADER_FLAG_32BIT_INDICES;
        }

        let mut writer = Self {
            disk: DiskWriter::new(inner)?,
            block_writer: BlockWriter::new(compressor),
            flags,
            num_frames,
            frame_table: Vec::with_capacity(num_frames as usize),
            aabb: Aabb::empty(),
            static_data_size: 0,
            animation_data_size: 0,
            uncompressed_animation_size: 0,
            static_data_written: false,
        };

        let header = writer.encode_header(0);
        let header_offset = writer.disk.write(header.data(), None)?;
        if header_offset != 0 {
            return Err(GeomCacheError::InvalidParameter(
                "geometry cache output must start empty".to_string(),
            ));
        }
        let table = vec![0u8; num_frames as usize * FRAME_INFO_SIZE];
        writer.disk.write(&table, None)?;
        Ok(writer)
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    pub fn frames_written(&self) -> u32 {
        self.frame_table.len() as u32
    }

    fn header_size(&self) -> u64 {
        (HEADER_SIZE + self.num_frames as usize * FRAME_INFO_SIZE) as u64
    }

    fn encode_header(&self, signature: u64) -> EncoderBuffer {
        let mut buffer = EncoderBuffer::with_capacity(HEADER_SIZE);
        buffer.encode_u64(signature);
        buffer.encode_u16(FILE_VERSION);
        buffer.encode_u16(self.block_writer.format() as u16);
        buffer.encode_u32(self.flags);
        buffer.encode_u32(self.num_frames);
        buffer.encode_u32(0);
        buffer.encode_u64(self.uncompressed_animation_size);
        buffer.encode_f32_slice(&self.aabb.to_floats());
        buffer
    }

    fn encode_frame_table(&self) -> EncoderBuffer {
        let mut buffer = EncoderBuffer::with_capacity(self.frame_table.len() * FRAME_INFO_SIZE);
        for entry in &self.frame_table {
            buffer.encode_u64(entry.offset);
            buffer.encode_u32(entry.size);
            buffer.encode_u32(entry.frame_type as u32);
            buffer.encode_f32(entry.time);
            buffer.encode_u32(0);
        }
        buffer
    }

    /// Flushes what has been written so far without completing the file.
    pub fn flush(&mut self) -> Status {
        self.disk.flush()
    }
}

impl<W: Write + Seek> FrameSink for GeomCacheWriter<W> {
    fn write_static_data(&mut self, payload: Vec<u8>) -> Status {
        if self.static_data_written {
            return Err(GeomCacheError::FrameSequence("static data written twice".to_string()));
        }
        let block = self.block_writer.write_block(&payload, &mut self.disk)?;
        self.static_data_size = block.size as u64;
        self.static_data_written = true;
        Ok(())
    }

    fn write_frame(&mut self, frame: EncodedFrame) -> Status {
        let expected = self.frame_table.len() as u32;
        if !self.static_data_written {
            return Err(GeomCacheError::FrameSequence(
                "frame written before static data".to_string(),
            ));
        }
        if frame.index != expected || expected >= self.num_frames {
            return Err(GeomCacheError::FrameSequence(format!(
                "expected frame {} of {}, got {}",
                expected, self.num_frames, frame.index
            )));
        }

        let block = self.block_writer.write_block(&frame.payload, &mut self.disk)?;
        self.frame_table.push(FrameTableEntry {
            offset: block.offset,
            size: block.size,
            frame_type: frame.frame_type,
            time: frame.time,
        });
        self.aabb.add(&frame.aabb);
        self.animation_data_size += block.size as u64;
        self.uncompressed_animation_size += block.uncompressed_size as u64;
        Ok(())
    }

    fn finish(mut self) -> StatusResult<WriterStats> {
        if self.frame_table.len() as u32 != self.num_frames {
            return Err(GeomCacheError::FrameSequence(format!(
                "only {} of {} frames were written",
                self.frame_table.len(),
                self.num_frames
            )));
        }

        let table = self.encode_frame_table();
        self.disk.write(table.data(), Some(SeekFrom::Start(HEADER_SIZE as u64)))?;
        self.disk.flush()?;

        // The signature goes in last so a failure above leaves an unplayable file
        let header = self.encode_header(FILE_SIGNATURE);
        self.disk.write(header.data(), Some(SeekFrom::Start(0)))?;
        self.disk.flush()?;

        let stats = WriterStats {
            header_size: self.header_size(),
            static_data_size: self.static_data_size,
            animation_data_size: self.animation_data_size,
            uncompressed_animation_size: self.uncompressed_animation_size,
            num_frames: self.num_frames,
        };
        info!(
            "Geometry cache written: {} frames, header {} B, static data {} B, animation {} B ({} B uncompressed)",
            stats.num_frames,
            stats.header_size,
            stats.static_data_size,
            stats.animation_data_size,
            stats.uncompressed_animation_size
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geomcache_core::file_format::BlockCompressionFormat;
    use std::io::Cursor;

    fn frame(index: u32, payload: Vec<u8>) -> EncodedFrame {
        EncodedFrame {
            index,
            frame_type: FrameType::IFrame,
            time: index as f32 / 30.0,
            aabb: Aabb::empty(),
            payload,
        }
    }

    #[test]
    fn test_placeholder_header_has_zero_signature() {
        let writer = GeomCacheWriter::new(Cursor::new(Vec::new()), &EncoderOptions::default(), 3).unwrap();
        assert_eq!(writer.disk.position(), (HEADER_SIZE + 3 * FRAME_INFO_SIZE) as u64);
        let bytes = writer.disk.into_inner().into_inner();
        assert_eq!(&bytes[..8], &[0; 8]);
    }

    #[test]
    fn test_frames_must_arrive_in_order() {
        let mut writer = GeomCacheWriter::new(Cursor::new(Vec::new()), &EncoderOptions::default(), 2).unwrap();
        assert!(writer.write_frame(frame(0, vec![0; 16])).is_err());
        writer.write_static_data(vec![0; 8]).unwrap();
        assert!(writer.write_frame(frame(1, vec![0; 16])).is_err());
        writer.write_frame(frame(0, vec![0; 16])).unwrap();
        assert!(writer.write_frame(frame(0, vec![0; 16])).is_err());
    }

    #[test]
    fn test_finish_requires_all_frames() {
        let mut writer = GeomCacheWriter::new(Cursor::new(Vec::new()), &EncoderOptions::default(), 2).unwrap();
        writer.write_static_data(vec![0; 8]).unwrap();
        writer.write_frame(frame(0, vec![0; 16])).unwrap();
        assert!(matches!(writer.finish(), Err(GeomCacheError::FrameSequence(_))));
    }

    #[test]
    fn test_store_layout() {
        let options = EncoderOptions::default()
            .with_block_compression_format(BlockCompressionFormat::Store)
            .with_32bit_indices(true);
        let mut writer = GeomCacheWriter::new(Cursor::new(Vec::new()), &options, 1).unwrap();
        writer.write_static_data(vec![1; 8]).unwrap();
        writer.write_frame(frame(0, vec![2; 16])).unwrap();
        let stats = writer.finish().unwrap();
        assert_eq!(stats.header_size, 80);
        assert_eq!(stats.static_data_size, 8);
        assert_eq!(stats.animation_data_size, 16);
        assert_eq!(stats.uncompressed_animation_size, 16);
        assert_eq!(stats.total_size(), 104);
    }
}
