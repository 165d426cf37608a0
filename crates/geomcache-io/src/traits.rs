//! Destination of assembled cache blocks.
//!
//! The encoder hands its output to a [`FrameSink`] so the same lifecycle code
//! drives a writer on the calling thread or one behind a channel:
//!
//! ```ignore
//! fn encode_into<S: FrameSink>(sink: S) -> StatusResult<WriterStats> {
//!     let mut encoder = GeomCacheEncoder::new(scene, options, num_frames, sink)?;
//!     // add_frame(...) per tick
//!     encoder.finish()
//! }
//! ```

use geomcache_core::file_format::FrameType;
use geomcache_core::status::{Status, StatusResult};
use geomcache_core::vector_extensions::Aabb;

/// One tick's uncompressed frame block, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub index: u32,
    pub frame_type: FrameType,
    pub time: f32,
    pub aabb: Aabb,
    pub payload: Vec<u8>,
}

/// Sizes reported once a cache file is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterStats {
    /// Header plus frame table.
    pub header_size: u64,
    pub static_data_size: u64,
    pub animation_data_size: u64,
    pub uncompressed_animation_size: u64,
    pub num_frames: u32,
}

impl WriterStats {
    pub fn total_size(&self) -> u64 {
        self.header_size + self.static_data_size + self.animation_data_size
    }
}

pub trait FrameSink {
    /// Writes the static node and mesh tables. Called once, before any frame.
    fn write_static_data(&mut self, payload: Vec<u8>) -> Status;

    /// Writes the next frame. Frames arrive in tick order, each exactly once.
    fn write_frame(&mut self, frame: EncodedFrame) -> Status;

    /// Patches the frame table and header. Until this returns the file
    /// carries a zero signature.
    fn finish(self) -> StatusResult<WriterStats>
    where
        Self: Sized;
}
