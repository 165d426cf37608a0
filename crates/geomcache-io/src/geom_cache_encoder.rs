//! Frame lifecycle manager.
//!
//! Drives one cache file tick by tick. Every tick gets a [`FrameInfo`] that
//! counts the mesh and node blocks still to be encoded (`encode_countdown`)
//! and the animated meshes still holding its raw frame (`done_countdown`).
//! A frame is handed to the sink once its encode countdown is zero and all
//! earlier frames are written. It is dropped from the pending queue once it
//! is written and no mesh holds its raw frame any more.

use std::collections::VecDeque;

use log::{debug, info};
use rayon::prelude::*;

use geomcache_core::encoder_buffer::EncoderBuffer;
use geomcache_core::encoder_options::EncoderOptions;
use geomcache_core::file_format::{FrameType, FRAME_ALIGNMENT, FRAME_HEADER_SIZE};
use geomcache_core::frame_schedule::FrameSchedule;
use geomcache_core::mesh::MeshFrameInput;
use geomcache_core::node::NodeFrame;
use geomcache_core::scene::Scene;
use geomcache_core::status::{GeomCacheError, Status, StatusResult};
use geomcache_core::stream_data::{MeshFrameData, RawFrame};
use geomcache_core::vector_extensions::Aabb;

use crate::mesh_encoder::{MeshEncodeOutput, MeshEncoder};
use crate::traits::{EncodedFrame, FrameSink, WriterStats};

/// Ingested data of one tick.
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    /// One entry per animated mesh, in mesh-table order.
    pub mesh_frames: Vec<MeshFrameInput>,
    /// One entry per node, depth-first pre-order.
    pub node_frames: Vec<NodeFrame>,
}

/// Bookkeeping of one tick between `add_frame` and eviction.
#[derive(Debug)]
pub struct FrameInfo {
    index: u32,
    frame_type: FrameType,
    time: f32,
    aabb: Aabb,
    encode_countdown: u32,
    done_countdown: u32,
    written: bool,
    mesh_blocks: Vec<Option<Vec<u8>>>,
    node_data: Vec<u8>,
}

impl FrameInfo {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Mesh and node blocks of this tick not encoded yet.
    pub fn encode_countdown(&self) -> u32 {
        self.encode_countdown
    }

    /// Animated meshes still holding this tick's raw frame.
    pub fn done_countdown(&self) -> u32 {
        self.done_countdown
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    fn take_payload(&mut self) -> StatusResult<Vec<u8>> {
        let index = self.index;
        let mesh_blocks = self
            .mesh_blocks
            .iter_mut()
            .map(|block| {
                block.take().ok_or_else(|| {
                    GeomCacheError::Internal(format!("frame {} flushed with a missing mesh block", index))
                })
            })
            .collect::<StatusResult<Vec<_>>>()?;

        let mesh_size: usize = mesh_blocks.iter().map(Vec::len).sum();
        let node_data_offset = u32::try_from(FRAME_HEADER_SIZE + mesh_size).map_err(|_| {
            GeomCacheError::InvalidParameter(format!("frame {} mesh data exceeds 4 GiB", index))
        })?;

        let mut buffer = EncoderBuffer::with_capacity(FRAME_HEADER_SIZE + mesh_size + self.node_data.len() + FRAME_ALIGNMENT);
        buffer.encode_u32(node_data_offset);
        buffer.encode_f32_slice(&self.aabb.to_floats());
        buffer.encode_u32(0);
        for block in &mesh_blocks {
            buffer.encode_bytes(block);
        }
        buffer.encode_bytes(&std::mem::take(&mut self.node_data));
        buffer.pad_to(FRAME_ALIGNMENT);
        Ok(buffer.into_vec())
    }
}

fn countdown(value: &mut u32, by: u32, what: &str, tick: u32) -> Status {
    *value = value
        .checked_sub(by)
        .ok_or_else(|| GeomCacheError::Internal(format!("{} of frame {} went below zero", what, tick)))?;
    Ok(())
}

pub struct GeomCacheEncoder<S: FrameSink> {
    scene: Scene,
    schedule: FrameSchedule,
    mesh_encoders: Vec<MeshEncoder>,
    pending: VecDeque<FrameInfo>,
    next_tick: u32,
    frames_written: u32,
    sink: S,
}

impl<S: FrameSink> GeomCacheEncoder<S> {
    /// Writes the static data of `scene` to `sink` and prepares the frame
    /// schedule for `num_frames` ticks.
    pub fn new(scene: Scene, options: &EncoderOptions, num_frames: u32, mut sink: S) -> StatusResult<Self> {
        if num_frames == 0 {
            return Err(GeomCacheError::InvalidParameter(
                "a geometry cache needs at least one frame".to_string(),
            ));
        }
        scene.validate()?;

        let schedule = FrameSchedule::new(num_frames, options.use_b_frames(), options.index_frame_distance());
        let mesh_encoders: Vec<MeshEncoder> = scene.animated_mesh_indices().into_iter().map(MeshEncoder::new).collect();

        info!(
            "Encoding {} frames: {} meshes ({} animated), {} nodes, {} compression, B-frames {}",
            num_frames,
            scene.meshes().len(),
            mesh_encoders.len(),
            scene.num_nodes(),
            options.block_compression_format(),
            if options.use_b_frames() { "on" } else { "off" }
        );

        let mut static_data = EncoderBuffer::new();
        scene.encode_static(&mut static_data, options.use_32bit_indices());
        debug!("Static data: {} bytes", static_data.size());
        sink.write_static_data(static_data.into_vec())?;

        Ok(Self {
            scene,
            schedule,
            mesh_encoders,
            pending: VecDeque::new(),
            next_tick: 0,
            frames_written: 0,
            sink,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn schedule(&self) -> &FrameSchedule {
        &self.schedule
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Ticks added so far.
    pub fn num_frames_added(&self) -> u32 {
        self.next_tick
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Frames not evicted yet, oldest first.
    pub fn pending_frames(&self) -> impl Iterator<Item = &FrameInfo> {
        self.pending.iter()
    }

    /// Raw mesh frames held across all animated meshes.
    pub fn num_raw_frames_held(&self) -> usize {
        self.mesh_encoders.iter().map(MeshEncoder::num_raw_frames).sum()
    }

    /// Adds the next tick.
    ///
    /// An empty `aabb` is replaced by the bounds of the visible mesh nodes.
    pub fn add_frame(&mut self, time: f32, aabb: Aabb, is_last_frame: bool, input: FrameInput) -> Status {
        let tick = self.next_tick;
        let num_frames = self.schedule.num_frames();
        if tick >= num_frames {
            return Err(GeomCacheError::FrameSequence(format!(
                "frame {} added to a cache of {} frames",
                tick, num_frames
            )));
        }
        if is_last_frame != (tick + 1 == num_frames) {
            return Err(GeomCacheError::FrameSequence(format!(
                "frame {} of {} flagged as last frame: {}",
                tick, num_frames, is_last_frame
            )));
        }
        if input.mesh_frames.len() != self.mesh_encoders.len() {
            return Err(GeomCacheError::FrameSequence(format!(
                "frame {} has {} mesh frames for {} animated meshes",
                tick,
                input.mesh_frames.len(),
                self.mesh_encoders.len()
            )));
        }

        // Everything that can reject the tick runs before any state changes,
        // so a failed call can be retried with corrected input.
        let use_counts = self.scene.mesh_use_counts(&input.node_frames)?;
        let aabb = if aabb.is_empty() {
            self.scene.frame_aabb(&input.node_frames)?
        } else {
            aabb
        };

        let num_meshes = self.mesh_encoders.len() as u32;
        let num_nodes = self.scene.num_nodes() as u32;
        let mut info = FrameInfo {
            index: tick,
            frame_type: self.schedule.frame_type(tick),
            time,
            aabb,
            encode_countdown: num_meshes + num_nodes,
            done_countdown: num_meshes,
            written: false,
            mesh_blocks: vec![None; self.mesh_encoders.len()],
            node_data: Vec::new(),
        };

        let mut node_data = EncoderBuffer::new();
        self.scene.encode_node_frames(&input.node_frames, &mut node_data)?;
        info.node_data = node_data.into_vec();
        countdown(&mut info.encode_countdown, num_nodes, "encode countdown", tick)?;

        let scene = &self.scene;
        let quantized: Vec<MeshFrameData> = self
            .mesh_encoders
            .par_iter()
            .zip(input.mesh_frames.par_iter())
            .map(|(encoder, frame)| scene.meshes()[encoder.mesh_index()].quantize_frame(frame))
            .collect::<StatusResult<_>>()?;

        self.pending.push_back(info);
        self.next_tick += 1;

        let schedule = &self.schedule;
        let outputs: Vec<StatusResult<MeshEncodeOutput>> = self
            .mesh_encoders
            .par_iter_mut()
            .zip(quantized.into_par_iter())
            .map(|(encoder, data)| {
                let mesh = &scene.meshes()[encoder.mesh_index()];
                let use_count = use_counts[encoder.mesh_index()];
                encoder.push_frame(mesh, schedule, tick, RawFrame::new(data, use_count))
            })
            .collect();

        for (slot, output) in outputs.into_iter().enumerate() {
            let output = output?;
            for (block_tick, block) in output.blocks {
                let info = self.frame_info_mut(block_tick)?;
                if info.mesh_blocks[slot].replace(block).is_some() {
                    return Err(GeomCacheError::Internal(format!(
                        "mesh slot {} encoded frame {} twice",
                        slot, block_tick
                    )));
                }
                countdown(&mut info.encode_countdown, 1, "encode countdown", block_tick)?;
            }
            for released in output.released {
                let info = self.frame_info_mut(released)?;
                countdown(&mut info.done_countdown, 1, "done countdown", released)?;
            }
        }

        self.flush_ready()?;
        self.evict();
        Ok(())
    }

    fn frame_info_mut(&mut self, tick: u32) -> StatusResult<&mut FrameInfo> {
        let front = self.pending.front().map_or(self.next_tick, |f| f.index);
        tick.checked_sub(front)
            .and_then(|offset| self.pending.get_mut(offset as usize))
            .ok_or_else(|| GeomCacheError::Internal(format!("frame {} is no longer pending", tick)))
    }

    /// Writes every frame whose blocks are all encoded, in tick order.
    fn flush_ready(&mut self) -> Status {
        for info in self.pending.iter_mut() {
            if info.written {
                continue;
            }
            if info.encode_countdown != 0 {
                break;
            }
            let payload = info.take_payload()?;
            debug!("Writing {:?} frame {} ({} bytes)", info.frame_type, info.index, payload.len());
            self.sink.write_frame(EncodedFrame {
                index: info.index,
                frame_type: info.frame_type,
                time: info.time,
                aabb: info.aabb,
                payload,
            })?;
            info.written = true;
            self.frames_written += 1;
        }
        Ok(())
    }

    fn evict(&mut self) {
        while self
            .pending
            .front()
            .is_some_and(|info| info.written && info.done_countdown == 0)
        {
            self.pending.pop_front();
        }
    }

    /// Completes the file. All frames must have been added.
    pub fn finish(self) -> StatusResult<WriterStats> {
        if self.next_tick != self.schedule.num_frames() {
            return Err(GeomCacheError::FrameSequence(format!(
                "finish after {} of {} frames",
                self.next_tick,
                self.schedule.num_frames()
            )));
        }
        if self.frames_written != self.next_tick || !self.pending.is_empty() || self.num_raw_frames_held() != 0 {
            return Err(GeomCacheError::Internal(format!(
                "{} frames written, {} still pending, {} raw frames held",
                self.frames_written,
                self.pending.len(),
                self.num_raw_frames_held()
            )));
        }
        self.sink.finish()
    }
}
