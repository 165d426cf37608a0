//! On-disk constants and enumerations of the geometry cache file format.
//!
//! All multi-byte values are little-endian. The header signature stays zero
//! until the writer has patched every forward reference, so a reader can tell
//! an incomplete file from a finished one.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use crate::status::GeomCacheError;

/// "GEOMCACH" read as a little-endian u64.
pub const FILE_SIGNATURE: u64 = u64::from_le_bytes(*b"GEOMCACH");
pub const FILE_VERSION: u16 = 1;

pub const HEADER_SIZE: usize = 56;
pub const FRAME_INFO_SIZE: usize = 24;
pub const FRAME_HEADER_SIZE: usize = 32;
pub const COMPRESSED_BLOCK_HEADER_SIZE: usize = 8;
pub const PREDICTOR_CONTROL_SIZE: usize = 4;
pub const FRAME_ALIGNMENT: usize = 16;

pub const MAX_INDEX_FRAME_DISTANCE: u32 = 30;
pub const DEFAULT_INDEX_FRAME_DISTANCE: u32 = 15;

pub const MESH_PREDICTOR_LOOK_BACK_MAX_DIST: u32 = 4096;
/// Predictor table entry for vertices without a parallelogram neighbour.
pub const NO_PREDICTOR: u16 = 0xFFFF;

pub const TANGENT_QUAT_PRECISION: u32 = 15;
pub const MIN_UV_RANGE: f32 = 0.001;
pub const MAX_VERTICES_16BIT_INDICES: usize = 65536;

pub const NO_MESH_INDEX: u32 = u32::MAX;

pub const HEADER_FLAG_PLAYBACK_FROM_MEMORY: u32 = 1 << 0;
pub const HEADER_FLAG_32BIT_INDICES: u32 = 1 << 1;

pub const MESH_FLAG_USE_PREDICTOR: u8 = 1 << 0;
pub const MESH_FRAME_FLAG_SPATIAL_PREDICTOR: u32 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlockCompressionFormat {
    Store = 0,
    #[default]
    Deflate = 1,
    Lz4Hc = 2,
    Zstd = 3,
}

impl TryFrom<u16> for BlockCompressionFormat {
    type Error = GeomCacheError;
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BlockCompressionFormat::Store),
            1 => Ok(BlockCompressionFormat::Deflate),
            2 => Ok(BlockCompressionFormat::Lz4Hc),
            3 => Ok(BlockCompressionFormat::Zstd),
            _ => Err(GeomCacheError::InvalidParameter(format!(
                "unknown block compression format {}",
                value
            ))),
        }
    }
}

impl FromStr for BlockCompressionFormat {
    type Err = GeomCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" => Ok(BlockCompressionFormat::Store),
            "deflate" => Ok(BlockCompressionFormat::Deflate),
            "lz4hc" => Ok(BlockCompressionFormat::Lz4Hc),
            "zstd" => Ok(BlockCompressionFormat::Zstd),
            other => Err(GeomCacheError::InvalidParameter(format!(
                "unknown block compression format '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BlockCompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockCompressionFormat::Store => "store",
            BlockCompressionFormat::Deflate => "deflate",
            BlockCompressionFormat::Lz4Hc => "lz4hc",
            BlockCompressionFormat::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    IFrame = 0,
    BFrame = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransformType {
    #[default]
    Constant = 0,
    Animated = 1,
}

/// Wire ids of the node kinds. The in-memory node uses `NodeKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Transform = 0,
    Mesh = 1,
    PhysicsGeometry = 2,
}

/// Bit set of per-vertex streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Streams(u8);

impl Streams {
    pub const NONE: Streams = Streams(0);
    pub const INDICES: Streams = Streams(1 << 0);
    pub const POSITIONS: Streams = Streams(1 << 1);
    pub const TEXCOORDS: Streams = Streams(1 << 2);
    pub const QTANGENTS: Streams = Streams(1 << 3);
    pub const COLORS: Streams = Streams(1 << 4);

    pub const fn from_bits(bits: u8) -> Self {
        Streams(bits & 0x1F)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Streams) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Streams) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Streams {
    type Output = Self;
    fn bitor(self, other: Self) -> Self {
        Streams(self.0 | other.0)
    }
}

impl BitOrAssign for Streams {
    fn bitor_assign(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitAnd for Streams {
    type Output = Self;
    fn bitand(self, other: Self) -> Self {
        Streams(self.0 & other.0)
    }
}
