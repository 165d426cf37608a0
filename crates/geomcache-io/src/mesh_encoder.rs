//! Per-mesh frame encoder.
//!
//! Holds the quantized raw frames one animated mesh still needs and turns
//! them into mesh blocks once their references are available. I-frames are
//! encoded as soon as they arrive; the B-frames before an I-frame are encoded
//! when that I-frame (their ceiling) arrives. A raw frame is dropped once the
//! schedule says no further encode step reads it.
//!
//! Block layouts:
//!
//! ```text
//! I-frame: flags u32, then per animated stream the values (spatial residuals
//!          when MESH_FRAME_FLAG_SPATIAL_PREDICTOR is set)
//! B-frame: flags u32 (0), then per animated stream a 4 byte predictor
//!          control followed by the temporal residuals
//! ```

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;

use geomcache_core::encoder_buffer::EncoderBuffer;
use geomcache_core::file_format::{FrameType, MESH_FRAME_FLAG_SPATIAL_PREDICTOR, PREDICTOR_CONTROL_SIZE};
use geomcache_core::frame_schedule::FrameSchedule;
use geomcache_core::mesh::Mesh;
use geomcache_core::mesh_predictor::MeshPredictor;
use geomcache_core::status::{GeomCacheError, Status, StatusResult};
use geomcache_core::stream_data::{
    visit_stream, Component, MeshFrameData, RawFrame, StreamAccessor, StreamKind, StreamVisitor,
};
use geomcache_core::temporal_predictor::{
    decode_residuals, encode_residuals, search_predictor, MotionReference, PredictorControl, TemporalReferences,
};

#[derive(Debug)]
struct RawFrameSlot {
    frame: RawFrame,
    readers_left: u32,
}

/// Mesh blocks produced and raw frames dropped by one `push_frame`.
#[derive(Debug, Default, PartialEq)]
pub struct MeshEncodeOutput {
    /// `(tick, block)` in ascending tick order.
    pub blocks: Vec<(u32, Vec<u8>)>,
    /// Ticks whose raw frame this mesh no longer holds.
    pub released: Vec<u32>,
}

/// References of a B-frame, borrowed from the raw frame arena.
struct BFrameReferences<'a> {
    floor: &'a MeshFrameData,
    ceil: &'a MeshFrameData,
    motion: Option<(&'a MeshFrameData, &'a MeshFrameData)>,
}

#[derive(Debug)]
pub struct MeshEncoder {
    mesh_index: usize,
    raw_frames: BTreeMap<u32, RawFrameSlot>,
}

impl MeshEncoder {
    pub fn new(mesh_index: usize) -> Self {
        Self {
            mesh_index,
            raw_frames: BTreeMap::new(),
        }
    }

    /// Index of the mesh in the scene mesh table.
    pub fn mesh_index(&self) -> usize {
        self.mesh_index
    }

    /// Number of raw frames currently held.
    pub fn num_raw_frames(&self) -> usize {
        self.raw_frames.len()
    }

    pub fn holds_raw_frame(&self, tick: u32) -> bool {
        self.raw_frames.contains_key(&tick)
    }

    /// Stores raw frame `tick` and encodes every tick it completes.
    pub fn push_frame(
        &mut self,
        mesh: &Mesh,
        schedule: &FrameSchedule,
        tick: u32,
        frame: RawFrame,
    ) -> StatusResult<MeshEncodeOutput> {
        if tick >= schedule.num_frames() {
            return Err(GeomCacheError::FrameSequence(format!(
                "mesh '{}': tick {} is past the last frame {}",
                mesh.name(),
                tick,
                schedule.num_frames()
            )));
        }
        if self.raw_frames.contains_key(&tick) {
            return Err(GeomCacheError::FrameSequence(format!(
                "mesh '{}': raw frame {} pushed twice",
                mesh.name(),
                tick
            )));
        }
        if frame.data.num_vertices() != mesh.num_vertices() {
            return Err(GeomCacheError::InvalidMesh(format!(
                "mesh '{}': raw frame {} has {} vertices, expected {}",
                mesh.name(),
                tick,
                frame.data.num_vertices(),
                mesh.num_vertices()
            )));
        }

        self.raw_frames.insert(
            tick,
            RawFrameSlot {
                frame,
                readers_left: schedule.raw_frame_readers(tick),
            },
        );

        let mut output = MeshEncodeOutput::default();
        let Some(batch) = schedule.encode_batch(tick) else {
            return Ok(output);
        };

        for t in batch {
            let block = self.encode_block(mesh, schedule, t)?;
            if cfg!(debug_assertions) {
                let decoded = self.decode_block(mesh, schedule, t, &block)?;
                debug_assert_eq!(
                    &decoded,
                    &self.raw(mesh, t)?.data,
                    "mesh '{}': block {} does not decode to its raw frame",
                    mesh.name(),
                    t
                );
            }
            trace!("Mesh '{}': encoded {:?} block {} ({} bytes)", mesh.name(), schedule.frame_type(t), t, block.len());
            output.blocks.push((t, block));
            self.release_reads(mesh, schedule, t, &mut output.released)?;
        }
        Ok(output)
    }

    fn raw(&self, mesh: &Mesh, tick: u32) -> StatusResult<&RawFrame> {
        self.raw_frames.get(&tick).map(|slot| &slot.frame).ok_or_else(|| {
            GeomCacheError::FrameSequence(format!("mesh '{}': raw frame {} is not available", mesh.name(), tick))
        })
    }

    fn release_reads(&mut self, mesh: &Mesh, schedule: &FrameSchedule, tick: u32, released: &mut Vec<u32>) -> Status {
        for read in schedule.raw_frames_read_by(tick) {
            let slot = self.raw_frames.get_mut(&read).ok_or_else(|| {
                GeomCacheError::Internal(format!("mesh '{}': raw frame {} released twice", mesh.name(), read))
            })?;
            slot.readers_left = slot.readers_left.checked_sub(1).ok_or_else(|| {
                GeomCacheError::Internal(format!("mesh '{}': raw frame {} has no readers left", mesh.name(), read))
            })?;
            if slot.readers_left == 0 {
                self.raw_frames.remove(&read);
                released.push(read);
            }
        }
        Ok(())
    }

    fn b_frame_references(&self, mesh: &Mesh, schedule: &FrameSchedule, tick: u32) -> StatusResult<BFrameReferences<'_>> {
        let floor = self.raw(mesh, schedule.floor_index_frame(tick))?;
        let ceil = self.raw(mesh, schedule.ceil_index_frame(tick))?;
        let motion = match schedule.motion_references(tick) {
            Some((prev0, prev1)) => {
                let prev0 = self.raw(mesh, prev0)?;
                let prev1 = self.raw(mesh, prev1)?;
                (prev0.is_visible() && prev1.is_visible()).then_some((&prev0.data, &prev1.data))
            }
            None => None,
        };
        Ok(BFrameReferences {
            floor: &floor.data,
            ceil: &ceil.data,
            motion,
        })
    }

    /// Encodes the mesh block of `tick`. All its references must be held.
    pub fn encode_block(&self, mesh: &Mesh, schedule: &FrameSchedule, tick: u32) -> StatusResult<Vec<u8>> {
        let current = &self.raw(mesh, tick)?.data;
        let mut buffer = EncoderBuffer::new();

        match schedule.frame_type(tick) {
            FrameType::IFrame => {
                let flags = if mesh.predictor().is_some() {
                    MESH_FRAME_FLAG_SPATIAL_PREDICTOR
                } else {
                    0
                };
                buffer.encode_u32(flags);
                for kind in StreamKind::selected(mesh.animated_streams()) {
                    visit_stream(
                        kind,
                        EncodeIndexStream {
                            current,
                            predictor: mesh.predictor(),
                            buffer: &mut buffer,
                        },
                    );
                }
            }
            FrameType::BFrame => {
                let refs = self.b_frame_references(mesh, schedule, tick)?;
                buffer.encode_u32(0);
                for kind in StreamKind::selected(mesh.animated_streams()) {
                    visit_stream(
                        kind,
                        EncodeTemporalStream {
                            current,
                            refs: &refs,
                            buffer: &mut buffer,
                        },
                    )?;
                }
            }
        }
        Ok(buffer.into_vec())
    }

    /// Reconstructs the raw data of `tick` from its block.
    ///
    /// Constant streams are taken from the held raw frame; B-frame references
    /// must still be held.
    pub fn decode_block(&self, mesh: &Mesh, schedule: &FrameSchedule, tick: u32, block: &[u8]) -> StatusResult<MeshFrameData> {
        let mut out = self.raw(mesh, tick)?.data.clone();
        let mut reader = Cursor::new(block);
        let flags = reader.read_u32::<LittleEndian>()?;
        let num_vertices = mesh.num_vertices();

        match schedule.frame_type(tick) {
            FrameType::IFrame => {
                let predictor = if flags & MESH_FRAME_FLAG_SPATIAL_PREDICTOR != 0 {
                    Some(mesh.predictor().ok_or_else(|| {
                        GeomCacheError::InvalidParameter(format!(
                            "mesh '{}': block {} uses a spatial predictor the mesh does not have",
                            mesh.name(),
                            tick
                        ))
                    })?)
                } else {
                    None
                };
                for kind in StreamKind::selected(mesh.animated_streams()) {
                    visit_stream(
                        kind,
                        DecodeIndexStream {
                            out: &mut out,
                            num_vertices,
                            predictor,
                            reader: &mut reader,
                        },
                    )?;
                }
            }
            FrameType::BFrame => {
                let refs = self.b_frame_references(mesh, schedule, tick)?;
                for kind in StreamKind::selected(mesh.animated_streams()) {
                    visit_stream(
                        kind,
                        DecodeTemporalStream {
                            out: &mut out,
                            num_vertices,
                            refs: &refs,
                            reader: &mut reader,
                        },
                    )?;
                }
            }
        }

        if reader.position() as usize != block.len() {
            return Err(GeomCacheError::InvalidParameter(format!(
                "mesh '{}': block {} has {} trailing bytes",
                mesh.name(),
                tick,
                block.len() - reader.position() as usize
            )));
        }
        Ok(out)
    }
}

struct EncodeIndexStream<'a> {
    current: &'a MeshFrameData,
    predictor: Option<&'a MeshPredictor>,
    buffer: &'a mut EncoderBuffer,
}

impl StreamVisitor for EncodeIndexStream<'_> {
    type Output = ();

    fn visit<T: Component>(self, kind: StreamKind, accessor: StreamAccessor<T>) {
        let values = (accessor.get)(self.current);
        match self.predictor {
            Some(predictor) => {
                for value in predictor.encode_residuals(values, kind.components()) {
                    value.encode(self.buffer);
                }
            }
            None => {
                for &value in values {
                    value.encode(self.buffer);
                }
            }
        }
    }
}

struct EncodeTemporalStream<'a> {
    current: &'a MeshFrameData,
    refs: &'a BFrameReferences<'a>,
    buffer: &'a mut EncoderBuffer,
}

impl StreamVisitor for EncodeTemporalStream<'_> {
    type Output = Status;

    fn visit<T: Component>(self, _kind: StreamKind, accessor: StreamAccessor<T>) -> Status {
        let refs = temporal_references(self.refs, &accessor);
        let values = (accessor.get)(self.current);
        let predictor = search_predictor(values, &refs)?;
        predictor.control().encode(self.buffer);
        for residual in encode_residuals(values, &refs, predictor)? {
            residual.encode(self.buffer);
        }
        Ok(())
    }
}

struct DecodeIndexStream<'a, R> {
    out: &'a mut MeshFrameData,
    num_vertices: usize,
    predictor: Option<&'a MeshPredictor>,
    reader: &'a mut R,
}

impl<R: Read> StreamVisitor for DecodeIndexStream<'_, R> {
    type Output = Status;

    fn visit<T: Component>(self, kind: StreamKind, accessor: StreamAccessor<T>) -> Status {
        let mut values = read_values::<T>(self.reader, self.num_vertices * kind.components())?;
        if let Some(predictor) = self.predictor {
            predictor.decode_residuals(&mut values, kind.components());
        }
        *(accessor.get_mut)(self.out) = values;
        Ok(())
    }
}

struct DecodeTemporalStream<'a, R> {
    out: &'a mut MeshFrameData,
    num_vertices: usize,
    refs: &'a BFrameReferences<'a>,
    reader: &'a mut R,
}

impl<R: Read> StreamVisitor for DecodeTemporalStream<'_, R> {
    type Output = Status;

    fn visit<T: Component>(self, kind: StreamKind, accessor: StreamAccessor<T>) -> Status {
        let mut control = [0u8; PREDICTOR_CONTROL_SIZE];
        self.reader.read_exact(&mut control)?;
        let predictor = PredictorControl::from_bytes(control).predictor()?;

        let residuals = read_values::<T>(self.reader, self.num_vertices * kind.components())?;
        let refs = temporal_references(self.refs, &accessor);
        let values = decode_residuals(&residuals, &refs, predictor)?;
        *(accessor.get_mut)(self.out) = values;
        Ok(())
    }
}

fn temporal_references<'a, T: Component>(
    refs: &'a BFrameReferences<'a>,
    accessor: &StreamAccessor<T>,
) -> TemporalReferences<'a, T> {
    let get = accessor.get;
    let motion = refs.motion.map(|(prev0, prev1)| MotionReference {
        prev0: get(prev0),
        prev1: get(prev1),
    });
    TemporalReferences::new(get(refs.floor), get(refs.ceil), motion)
}

fn read_values<T: Component>(reader: &mut impl Read, count: usize) -> StatusResult<Vec<T>> {
    (0..count).map(|_| Ok(T::read(reader)?)).collect()
}
