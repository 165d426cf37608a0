use std::fmt;
use std::str::FromStr;

use crate::file_format::{MIN_UV_RANGE, TANGENT_QUAT_PRECISION};
use crate::status::GeomCacheError;
use crate::vector_extensions::{Aabb, Quaternion, Vector3f};

const MAX_POSITION_BITS: u8 = 16;

/// Target precision of quantized positions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PositionPrecision {
    /// Full 16 bits on every axis.
    #[default]
    Max,
    /// Largest allowed quantization error in millimetres.
    Millimeters(f64),
}

impl FromStr for PositionPrecision {
    type Err = GeomCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("max") {
            return Ok(PositionPrecision::Max);
        }
        match s.parse::<f64>() {
            Ok(mm) if mm > 0.0 && mm.is_finite() => Ok(PositionPrecision::Millimeters(mm)),
            _ => Err(GeomCacheError::InvalidParameter(format!(
                "position precision must be 'max' or a positive number of millimetres, got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for PositionPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionPrecision::Max => f.write_str("max"),
            PositionPrecision::Millimeters(mm) => write!(f, "{}", mm),
        }
    }
}

/// Texture coordinate wrap range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum UvMax {
    /// Use the largest texcoord component found in the mesh.
    #[default]
    Auto,
    Fixed(f32),
}

impl UvMax {
    /// Resolves the wrap range for a set of texcoords, never below `MIN_UV_RANGE`.
    pub fn resolve(self, texcoords: &[[f32; 2]]) -> f32 {
        match self {
            UvMax::Fixed(value) => value.max(MIN_UV_RANGE),
            UvMax::Auto => detect_uv_max(texcoords),
        }
    }
}

impl FromStr for UvMax {
    type Err = GeomCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") || s.is_empty() {
            return Ok(UvMax::Auto);
        }
        match s.parse::<f32>() {
            Ok(value) if value.is_finite() => Ok(UvMax::Fixed(value)),
            _ => Err(GeomCacheError::InvalidParameter(format!(
                "uv max must be 'auto' or a number, got '{}'",
                s
            ))),
        }
    }
}

/// Per-axis position bit depth that reaches `precision` over `aabb`.
///
/// Extents are in metres, precision in millimetres.
pub fn position_bits_for_precision(aabb: &Aabb, precision: PositionPrecision) -> [u8; 3] {
    let mm = match precision {
        PositionPrecision::Max => return [MAX_POSITION_BITS; 3],
        PositionPrecision::Millimeters(mm) => mm,
    };

    let size = aabb.size();
    let mut bits = [1u8; 3];
    for (axis, out) in bits.iter_mut().enumerate() {
        let extent = size[axis] as f64;
        if extent <= 0.0 {
            continue;
        }
        let steps = (extent * 1000.0 / mm).log2().ceil();
        *out = steps.clamp(1.0, MAX_POSITION_BITS as f64) as u8;
    }
    bits
}

/// Maps positions into the mesh bounding box at a fixed per-axis bit depth.
#[derive(Debug, Clone, Copy)]
pub struct PositionQuantizer {
    min: Vector3f,
    size: Vector3f,
    multiplier: Vector3f,
}

impl PositionQuantizer {
    pub fn new(aabb: &Aabb, bits: [u8; 3]) -> Self {
        let raw_size = aabb.size();
        let fix = |v: f32| if v == 0.0 { 1.0 } else { v };
        let multiplier = |b: u8| ((2u32 << (b.clamp(1, MAX_POSITION_BITS) - 1)) - 1) as f32;
        let min = if aabb.is_empty() { Vector3f::default() } else { aabb.min };
        Self {
            min,
            size: Vector3f::new(fix(raw_size.x), fix(raw_size.y), fix(raw_size.z)),
            multiplier: Vector3f::new(multiplier(bits[0]), multiplier(bits[1]), multiplier(bits[2])),
        }
    }

    pub fn quantize(&self, position: [f32; 3]) -> [u16; 3] {
        let mut out = [0u16; 3];
        for (axis, value) in out.iter_mut().enumerate() {
            let mapped = (position[axis] - self.min[axis]) / self.size[axis];
            *value = (mapped * self.multiplier[axis]).clamp(0.0, u16::MAX as f32) as u16;
        }
        out
    }

    pub fn dequantize(&self, quantized: [u16; 3]) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for (axis, value) in out.iter_mut().enumerate() {
            *value = quantized[axis] as f32 / self.multiplier[axis] * self.size[axis] + self.min[axis];
        }
        out
    }
}

/// Largest texcoord component, clamped to `MIN_UV_RANGE`.
pub fn detect_uv_max(texcoords: &[[f32; 2]]) -> f32 {
    texcoords
        .iter()
        .flat_map(|uv| uv.iter().copied())
        .filter(|v| v.is_finite())
        .fold(MIN_UV_RANGE, f32::max)
}

/// Wraps a texcoord at `uv_max` and maps it to signed 15 bits.
pub fn quantize_texcoord(uv: [f32; 2], uv_max: f32) -> [i16; 2] {
    let wrap = |v: f32| ((v % uv_max) / uv_max * 32767.0) as i16;
    [wrap(uv[0]), wrap(uv[1])]
}

#[inline]
pub fn quantize_color(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0) as u8
}

/// Per-vertex tangent space as produced by ingestion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentFrame {
    pub tangent: Vector3f,
    pub bitangent: Vector3f,
    pub normal: Vector3f,
}

impl Default for TangentFrame {
    fn default() -> Self {
        Self {
            tangent: Vector3f::new(1.0, 0.0, 0.0),
            bitangent: Vector3f::new(0.0, 1.0, 0.0),
            normal: Vector3f::new(0.0, 0.0, 1.0),
        }
    }
}

impl TangentFrame {
    pub fn new(tangent: Vector3f, bitangent: Vector3f, normal: Vector3f) -> Self {
        Self { tangent, bitangent, normal }
    }

    /// True when tangent x bitangent points away from the normal.
    pub fn is_reflected(&self) -> bool {
        self.tangent.cross(self.bitangent).normalized().dot(self.normal) < 0.0
    }
}

/// Quantized tangent-frame quaternion. The sign of `w` carries the reflection.
pub fn encode_qtangent(frame: &TangentFrame, reflected: bool) -> [i16; 4] {
    let multiplier = ((2u32 << (TANGENT_QUAT_PRECISION - 1)) - 1) as f32;
    let bias = 1.0 / multiplier;
    let bias_scale = (1.0 - bias * bias).sqrt();

    let rows = orthonormal_rows(frame).unwrap_or([
        Vector3f::new(1.0, 0.0, 0.0),
        Vector3f::new(0.0, 1.0, 0.0),
        Vector3f::new(0.0, 0.0, 1.0),
    ]);

    let mut q = Quaternion::from_rows(rows);
    q.x = -q.x;
    q.y = -q.y;
    q.z = -q.z;
    if q.w < 0.0 {
        q = -q;
    }

    // w must never be zero or the reflection sign is lost
    if q.w < bias && q.w > -bias {
        q = q * bias_scale;
        q.w = bias;
    }

    if reflected {
        q = -q;
    }

    [
        (q.x * multiplier) as i16,
        (q.y * multiplier) as i16,
        (q.z * multiplier) as i16,
        (q.w * multiplier) as i16,
    ]
}

/// Encodes a tangent frame while holding its handedness to `reference`.
///
/// Tick 0 passes `None` and records the returned flag; later ticks pass the
/// recorded flag and a mismatching frame gets its bitangent flipped.
pub fn encode_qtangent_with_reflection(frame: &TangentFrame, reference: Option<bool>) -> ([i16; 4], bool) {
    let mut frame = *frame;
    let mut reflected = frame.is_reflected();
    if let Some(expected) = reference {
        if expected != reflected {
            reflected = expected;
            frame.bitangent = -frame.bitangent;
        }
    }
    frame.normal = frame.tangent.cross(frame.bitangent).normalized();
    (encode_qtangent(&frame, reflected), reflected)
}

fn orthonormal_rows(frame: &TangentFrame) -> Option<[Vector3f; 3]> {
    let t = frame.tangent.normalized();
    let b = (frame.bitangent - t * t.dot(frame.bitangent)).normalized();
    let n = t.cross(b);

    let rows = [t, b, n];
    if !rows.iter().all(|r| r.is_finite()) {
        return None;
    }

    const TOLERANCE: f32 = 0.1;
    let unit = rows.iter().all(|r| (r.length() - 1.0).abs() <= TOLERANCE);
    let orthogonal = t.dot(b).abs() <= TOLERANCE;
    let right_handed = (t.cross(b) - n).length() <= TOLERANCE;
    if unit && orthogonal && right_handed {
        Some(rows)
    } else {
        None
    }
}
