//! Geometry cache writing.
//!
//! Turns a compiled [`Scene`](geomcache_core::Scene) and its per-tick data
//! into a block-compressed, seekable cache file.
//!
//! # Pipeline
//!
//! | Stage | Type |
//! |-------|------|
//! | per-mesh I/B frame encoding | [`MeshEncoder`] |
//! | frame lifecycle, assembly   | [`GeomCacheEncoder`] |
//! | header, frame table, blocks | [`GeomCacheWriter`] |
//! | background disk writes      | [`ThreadedWriter`] |
//!
//! Any [`FrameSink`] can sit behind the encoder:
//!
//! ```ignore
//! use geomcache_io::{GeomCacheEncoder, GeomCacheWriter, ThreadedWriter};
//!
//! let writer = GeomCacheWriter::create("out.cax", &options, num_frames)?;
//! let sink = ThreadedWriter::spawn(writer)?;
//! let mut encoder = GeomCacheEncoder::new(scene, &options, num_frames, sink)?;
//! for (tick, input) in frames.into_iter().enumerate() {
//!     let last = tick as u32 + 1 == num_frames;
//!     encoder.add_frame(tick as f32 / 30.0, Aabb::empty(), last, input)?;
//! }
//! let stats = encoder.finish()?;
//! ```
//!
//! Until `finish` returns the file carries a zero signature, so an aborted
//! encode never looks playable.

// =============================================================================
// File output
// =============================================================================

pub mod block_writer;
pub mod compression;
pub mod disk_writer;
pub mod geom_cache_writer;
pub mod traits;
pub mod write_pipeline;

// =============================================================================
// Encoding
// =============================================================================

pub mod geom_cache_encoder;
pub mod mesh_encoder;

pub use block_writer::{BlockInfo, BlockWriter};
pub use compression::{compressor_for, Compressor};
pub use disk_writer::DiskWriter;
pub use geom_cache_encoder::{FrameInfo, FrameInput, GeomCacheEncoder};
pub use geom_cache_writer::GeomCacheWriter;
pub use mesh_encoder::MeshEncoder;
pub use traits::{EncodedFrame, FrameSink, WriterStats};
pub use write_pipeline::ThreadedWriter;
