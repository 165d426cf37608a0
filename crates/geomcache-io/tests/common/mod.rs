//! Scene fixtures and a minimal cache file reader for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use geomcache_core::file_format::{
    BlockCompressionFormat, TransformType, COMPRESSED_BLOCK_HEADER_SIZE, FRAME_INFO_SIZE, HEADER_SIZE,
};
use geomcache_core::mesh::{Mesh, MeshFrameInput, MeshSource, StreamVariation};
use geomcache_core::node::{Node, NodeFrame, NodeKind};
use geomcache_core::quantization_utils::TangentFrame;
use geomcache_core::scene::Scene;
use geomcache_core::vector_extensions::{Aabb, QuatTns, Quaternion, Vector3f};
use geomcache_core::EncoderOptions;
use geomcache_io::{compressor_for, FrameInput, FrameSink, GeomCacheEncoder, WriterStats};

pub const SIDE: u32 = 6;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn grid_indices(materials: u16) -> BTreeMap<u16, Vec<u32>> {
    let mut out = BTreeMap::new();
    if materials == 0 {
        return out;
    }
    let mut quad = 0u16;
    for y in 0..SIDE - 1 {
        for x in 0..SIDE - 1 {
            let i = y * SIDE + x;
            out.entry(quad % materials)
                .or_insert_with(Vec::new)
                .extend_from_slice(&[i, i + 1, i + SIDE, i + 1, i + SIDE + 1, i + SIDE]);
            quad += 1;
        }
    }
    out
}

/// Grid sample at `tick`. `colors` adds an RGBA stream.
pub fn grid_frame(tick: u32, colors: bool) -> MeshFrameInput {
    let phase = tick as f32 * 0.25;
    let mut positions = Vec::new();
    let mut texcoords = Vec::new();
    let mut tangent_frames = Vec::new();
    let mut rgba = Vec::new();
    for y in 0..SIDE {
        for x in 0..SIDE {
            let (fx, fy) = (x as f32, y as f32);
            positions.push([fx, fy, (fx * 0.7 + phase).sin() * 0.5]);
            texcoords.push([fx / 8.0 + phase * 0.01, fy / 8.0]);
            let slope = (fx * 0.7 + phase).cos() * 0.35;
            let tangent = Vector3f::new(1.0, 0.0, slope).normalized();
            let bitangent = Vector3f::new(0.0, 1.0, 0.0);
            tangent_frames.push(TangentFrame::new(tangent, bitangent, tangent.cross(bitangent)));
            rgba.push([fx / 6.0, fy / 6.0, (phase * 0.1).min(1.0), 1.0]);
        }
    }
    MeshFrameInput {
        positions,
        texcoords,
        tangent_frames,
        colors: colors.then_some(rgba),
    }
}

fn grid_source(name: &str, hash: u64, materials: u16, variation: StreamVariation) -> MeshSource {
    MeshSource {
        name: name.to_string(),
        hash,
        indices: grid_indices(materials),
        variation,
        aabb: Aabb::from_points(&[[0.0, 0.0, -0.5], [5.0, 5.0, 0.5]]),
    }
}

/// Scene with an animated colored mesh (3 materials), a constant mesh used by
/// two nodes, an animated mesh without materials, an animated transform and a
/// physics node.
///
/// Depth-first nodes: root, spinner, colored, plain, shared_a, shared_b, proxy.
pub fn test_scene(options: &EncoderOptions) -> Scene {
    let all_varying = StreamVariation {
        positions: true,
        texcoords: true,
        normals: true,
        colors: true,
        ..Default::default()
    };
    let positions_only = StreamVariation {
        positions: true,
        ..Default::default()
    };

    let colored = Mesh::build(&grid_source("colored", 1, 3, all_varying), &grid_frame(0, true), options).unwrap();
    let constant_a = Mesh::build(&grid_source("rock", 2, 1, StreamVariation::default()), &grid_frame(0, false), options).unwrap();
    let constant_b = Mesh::build(&grid_source("rock_copy", 2, 1, StreamVariation::default()), &grid_frame(0, false), options).unwrap();
    let plain = Mesh::build(&grid_source("plain", 3, 0, positions_only), &grid_frame(0, false), options).unwrap();

    let mut scene = Scene::new(Node::new("root", NodeKind::Transform));
    let colored = scene.add_mesh(colored);
    let shared_a = scene.add_mesh(constant_a);
    let shared_b = scene.add_mesh(constant_b);
    let plain = scene.add_mesh(plain);

    let spinner = Node::new("spinner", NodeKind::Transform)
        .with_transform(TransformType::Animated, QuatTns::IDENTITY)
        .with_child(Node::new("colored", NodeKind::Mesh { mesh_index: colored }));
    let root = Node::new("root", NodeKind::Transform)
        .with_child(spinner)
        .with_child(Node::new("plain", NodeKind::Mesh { mesh_index: plain }))
        .with_child(Node::new("shared_a", NodeKind::Mesh { mesh_index: shared_a }))
        .with_child(Node::new("shared_b", NodeKind::Mesh { mesh_index: shared_b }))
        .with_child(Node::new(
            "proxy",
            NodeKind::PhysicsGeometry {
                blob: vec![1, 2, 3, 4, 5],
            },
        ));
    scene.set_root(root);
    scene
}

pub const NUM_NODES: usize = 7;

pub fn frame_input(tick: u32) -> FrameInput {
    let angle = tick as f32 * 0.1;
    let mut node_frames = vec![NodeFrame::default(); NUM_NODES];
    node_frames[1].transform = QuatTns {
        rotation: Quaternion::new(0.0, (angle * 0.5).sin(), 0.0, (angle * 0.5).cos()),
        translation: Vector3f::new(tick as f32, 0.0, 0.0),
        scale: Vector3f::splat(1.0),
    };
    // the plain mesh blinks, which turns off motion prediction around it
    node_frames[3].visible = tick % 4 != 2;
    FrameInput {
        mesh_frames: vec![grid_frame(tick, true), grid_frame(tick, false)],
        node_frames,
    }
}

/// Feeds `num_frames` ticks into a new encoder over `sink`.
pub fn encode<S: FrameSink>(options: &EncoderOptions, num_frames: u32, sink: S) -> WriterStats {
    let mut encoder = GeomCacheEncoder::new(test_scene(options), options, num_frames, sink).unwrap();
    for t in 0..num_frames {
        encoder
            .add_frame(t as f32 / 30.0, Aabb::empty(), t + 1 == num_frames, frame_input(t))
            .unwrap();
    }
    encoder.finish().unwrap()
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap())
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn u64_at(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

fn f32_at(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub signature: u64,
    pub version: u16,
    pub format: BlockCompressionFormat,
    pub flags: u32,
    pub num_frames: u32,
    pub total_uncompressed_size: u64,
    pub aabb: [f32; 6],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEntry {
    pub offset: u64,
    pub size: u32,
    pub frame_type: u32,
    pub time: f32,
}

pub struct CacheFile {
    pub bytes: Vec<u8>,
    pub header: Header,
    pub frames: Vec<FrameEntry>,
}

impl CacheFile {
    pub fn parse(bytes: Vec<u8>) -> Self {
        let header = Header {
            signature: u64_at(&bytes, 0),
            version: u16_at(&bytes, 8),
            format: BlockCompressionFormat::try_from(u16_at(&bytes, 10)).unwrap(),
            flags: u32_at(&bytes, 12),
            num_frames: u32_at(&bytes, 16),
            total_uncompressed_size: u64_at(&bytes, 24),
            aabb: std::array::from_fn(|i| f32_at(&bytes, 32 + i * 4)),
        };
        let frames = (0..header.num_frames as usize)
            .map(|i| {
                let at = HEADER_SIZE + i * FRAME_INFO_SIZE;
                FrameEntry {
                    offset: u64_at(&bytes, at),
                    size: u32_at(&bytes, at + 8),
                    frame_type: u32_at(&bytes, at + 12),
                    time: f32_at(&bytes, at + 16),
                }
            })
            .collect();
        Self { bytes, header, frames }
    }

    pub fn static_data_offset(&self) -> usize {
        HEADER_SIZE + self.frames.len() * FRAME_INFO_SIZE
    }

    /// Decompressed bytes of the block at `offset` spanning `size` bytes.
    pub fn block(&self, offset: usize, size: usize) -> Vec<u8> {
        let raw = &self.bytes[offset..offset + size];
        if self.header.format == BlockCompressionFormat::Store {
            return raw.to_vec();
        }
        let uncompressed = u32_at(raw, 0) as usize;
        let compressed = u32_at(raw, 4) as usize;
        assert_eq!(compressed + COMPRESSED_BLOCK_HEADER_SIZE, size);
        compressor_for(self.header.format)
            .decompress(&raw[COMPRESSED_BLOCK_HEADER_SIZE..], uncompressed)
            .unwrap()
    }

    pub fn frame(&self, index: usize) -> Vec<u8> {
        let entry = self.frames[index];
        self.block(entry.offset as usize, entry.size as usize)
    }

    /// Static data block; it ends where the first frame begins.
    pub fn static_data(&self) -> Vec<u8> {
        let start = self.static_data_offset();
        let end = self.frames.first().map_or(self.bytes.len(), |f| f.offset as usize);
        self.block(start, end - start)
    }
}

pub fn read_cache(path: &std::path::Path) -> CacheFile {
    CacheFile::parse(std::fs::read(path).unwrap())
}

pub fn u32_field(bytes: &[u8], at: usize) -> u32 {
    u32_at(bytes, at)
}
