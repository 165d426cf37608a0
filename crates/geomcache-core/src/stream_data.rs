//! Quantized per-vertex streams of one mesh for one tick.
//!
//! Streams are stored flat (`num_vertices * components` values) so the
//! temporal and spatial predictors can run over plain slices of the element
//! type. Colors are planar: one byte stream per channel.

use std::fmt::Debug;

use num_traits::{AsPrimitive, WrappingAdd, WrappingSub};

use crate::encoder_buffer::EncoderBuffer;
use crate::file_format::Streams;

/// Scalar element of a quantized stream.
pub trait Component:
    Copy + Default + PartialEq + Debug + Send + Sync + WrappingAdd + WrappingSub + AsPrimitive<i32> + 'static
{
    const SIZE: usize;

    /// Truncates an i32 into the element type, two's complement wrap.
    fn wrap_from_i32(value: i32) -> Self;

    fn encode(self, buffer: &mut EncoderBuffer);

    fn for_each_le_byte(self, f: impl FnMut(u8));

    /// Reads one little-endian element.
    fn read(reader: &mut impl std::io::Read) -> std::io::Result<Self>;
}

macro_rules! impl_component {
    ($t:ty, $encode:ident) => {
        impl Component for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            #[inline]
            fn wrap_from_i32(value: i32) -> Self {
                value as $t
            }

            #[inline]
            fn encode(self, buffer: &mut EncoderBuffer) {
                buffer.$encode(self);
            }

            #[inline]
            fn for_each_le_byte(self, f: impl FnMut(u8)) {
                self.to_le_bytes().into_iter().for_each(f);
            }

            #[inline]
            fn read(reader: &mut impl std::io::Read) -> std::io::Result<Self> {
                let mut bytes = [0u8; std::mem::size_of::<$t>()];
                reader.read_exact(&mut bytes)?;
                Ok(<$t>::from_le_bytes(bytes))
            }
        }
    };
}

impl_component!(u8, encode_u8);
impl_component!(u16, encode_u16);
impl_component!(i16, encode_i16);

/// One per-vertex stream in canonical file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Positions,
    Texcoords,
    QTangents,
    Red,
    Green,
    Blue,
    Alpha,
}

impl StreamKind {
    pub const CANONICAL_ORDER: [StreamKind; 7] = [
        StreamKind::Positions,
        StreamKind::Texcoords,
        StreamKind::QTangents,
        StreamKind::Red,
        StreamKind::Green,
        StreamKind::Blue,
        StreamKind::Alpha,
    ];

    /// Values per vertex.
    pub fn components(self) -> usize {
        match self {
            StreamKind::Positions => 3,
            StreamKind::Texcoords => 2,
            StreamKind::QTangents => 4,
            StreamKind::Red | StreamKind::Green | StreamKind::Blue | StreamKind::Alpha => 1,
        }
    }

    pub fn stream_bit(self) -> Streams {
        match self {
            StreamKind::Positions => Streams::POSITIONS,
            StreamKind::Texcoords => Streams::TEXCOORDS,
            StreamKind::QTangents => Streams::QTANGENTS,
            StreamKind::Red | StreamKind::Green | StreamKind::Blue | StreamKind::Alpha => Streams::COLORS,
        }
    }

    /// Vertex streams selected by `streams`, in canonical order.
    pub fn selected(streams: Streams) -> impl Iterator<Item = StreamKind> {
        Self::CANONICAL_ORDER
            .into_iter()
            .filter(move |kind| streams.contains(kind.stream_bit()))
    }
}

/// Typed field access for one stream of `MeshFrameData`.
pub struct StreamAccessor<T> {
    pub get: fn(&MeshFrameData) -> &[T],
    pub get_mut: fn(&mut MeshFrameData) -> &mut Vec<T>,
}

/// Generic per-stream operation; `visit_stream` resolves the element type.
pub trait StreamVisitor {
    type Output;
    fn visit<T: Component>(self, kind: StreamKind, accessor: StreamAccessor<T>) -> Self::Output;
}

pub fn visit_stream<V: StreamVisitor>(kind: StreamKind, visitor: V) -> V::Output {
    match kind {
        StreamKind::Positions => visitor.visit(
            kind,
            StreamAccessor::<u16> {
                get: |d| d.positions.as_slice(),
                get_mut: |d| &mut d.positions,
            },
        ),
        StreamKind::Texcoords => visitor.visit(
            kind,
            StreamAccessor::<i16> {
                get: |d| d.texcoords.as_slice(),
                get_mut: |d| &mut d.texcoords,
            },
        ),
        StreamKind::QTangents => visitor.visit(
            kind,
            StreamAccessor::<i16> {
                get: |d| d.qtangents.as_slice(),
                get_mut: |d| &mut d.qtangents,
            },
        ),
        StreamKind::Red => visitor.visit(
            kind,
            StreamAccessor::<u8> {
                get: |d| d.colors[0].as_slice(),
                get_mut: |d| &mut d.colors[0],
            },
        ),
        StreamKind::Green => visitor.visit(
            kind,
            StreamAccessor::<u8> {
                get: |d| d.colors[1].as_slice(),
                get_mut: |d| &mut d.colors[1],
            },
        ),
        StreamKind::Blue => visitor.visit(
            kind,
            StreamAccessor::<u8> {
                get: |d| d.colors[2].as_slice(),
                get_mut: |d| &mut d.colors[2],
            },
        ),
        StreamKind::Alpha => visitor.visit(
            kind,
            StreamAccessor::<u8> {
                get: |d| d.colors[3].as_slice(),
                get_mut: |d| &mut d.colors[3],
            },
        ),
    }
}

/// Quantized vertex streams of one mesh at one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshFrameData {
    pub positions: Vec<u16>,
    pub texcoords: Vec<i16>,
    pub qtangents: Vec<i16>,
    /// Red, green, blue, alpha. Empty when the mesh has no colors.
    pub colors: [Vec<u8>; 4],
}

impl MeshFrameData {
    pub fn with_vertices(num_vertices: usize, has_colors: bool) -> Self {
        let color_len = if has_colors { num_vertices } else { 0 };
        Self {
            positions: vec![0; num_vertices * 3],
            texcoords: vec![0; num_vertices * 2],
            qtangents: vec![0; num_vertices * 4],
            colors: std::array::from_fn(|_| vec![0; color_len]),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn has_colors(&self) -> bool {
        !self.colors[0].is_empty()
    }

    #[inline]
    pub fn position(&self, vertex: usize) -> [u16; 3] {
        let p = &self.positions[vertex * 3..vertex * 3 + 3];
        [p[0], p[1], p[2]]
    }

    /// Writes the streams in `streams` in canonical order.
    pub fn encode_streams(&self, streams: Streams, buffer: &mut EncoderBuffer) {
        for kind in StreamKind::selected(streams) {
            visit_stream(kind, EncodeStream { data: self, buffer: &mut *buffer });
        }
    }
}

struct EncodeStream<'a> {
    data: &'a MeshFrameData,
    buffer: &'a mut EncoderBuffer,
}

impl StreamVisitor for EncodeStream<'_> {
    type Output = ();

    fn visit<T: Component>(self, _kind: StreamKind, accessor: StreamAccessor<T>) {
        for &value in (accessor.get)(self.data) {
            value.encode(self.buffer);
        }
    }
}

/// One tick of raw mesh data plus the number of visible nodes using it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    pub data: MeshFrameData,
    pub use_count: u32,
}

impl RawFrame {
    pub fn new(data: MeshFrameData, use_count: u32) -> Self {
        Self { data, use_count }
    }

    pub fn is_visible(&self) -> bool {
        self.use_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_order() {
        let kinds: Vec<_> = StreamKind::selected(Streams::COLORS | Streams::POSITIONS).collect();
        assert_eq!(
            kinds,
            vec![
                StreamKind::Positions,
                StreamKind::Red,
                StreamKind::Green,
                StreamKind::Blue,
                StreamKind::Alpha
            ]
        );
        assert_eq!(StreamKind::selected(Streams::INDICES).count(), 0);
    }

    #[test]
    fn test_encode_streams_layout() {
        let mut data = MeshFrameData::with_vertices(1, true);
        data.positions = vec![1, 2, 3];
        data.texcoords = vec![-1, 4];
        data.colors = [vec![10], vec![20], vec![30], vec![40]];

        let mut buffer = EncoderBuffer::new();
        data.encode_streams(Streams::POSITIONS | Streams::TEXCOORDS | Streams::COLORS, &mut buffer);
        assert_eq!(buffer.data(), &[1, 0, 2, 0, 3, 0, 0xFF, 0xFF, 4, 0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_wrap_from_i32() {
        assert_eq!(u16::wrap_from_i32(-1), u16::MAX);
        assert_eq!(i16::wrap_from_i32(40000), (40000u16) as i16);
        assert_eq!(u8::wrap_from_i32(256), 0);
    }
}
