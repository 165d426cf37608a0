//! Compiled mesh: stream classification, vertex order, quantization and the
//! static mesh record.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::encoder_buffer::EncoderBuffer;
use crate::encoder_options::EncoderOptions;
use crate::file_format::{Streams, MAX_VERTICES_16BIT_INDICES, MESH_FLAG_USE_PREDICTOR};
use crate::mesh_predictor::MeshPredictor;
use crate::quantization_utils::{
    encode_qtangent_with_reflection, position_bits_for_precision, quantize_color, quantize_texcoord,
    PositionQuantizer, TangentFrame,
};
use crate::status::{GeomCacheError, StatusResult};
use crate::stream_data::MeshFrameData;
use crate::vector_extensions::Aabb;

/// Which ingested attributes change over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamVariation {
    pub indices: bool,
    pub positions: bool,
    pub texcoords: bool,
    pub normals: bool,
    pub colors: bool,
}

/// Splits the vertex streams into constant and animated sets.
///
/// Returns `(constant, animated)`. Varying indices mean heterogeneous
/// topology, which is not supported.
pub fn classify_streams(variation: StreamVariation, has_colors: bool) -> StatusResult<(Streams, Streams)> {
    if variation.indices {
        return Err(GeomCacheError::UnsupportedFeature(
            "heterogeneous topology is not supported".to_string(),
        ));
    }

    let mut constant = Streams::INDICES;
    let mut animated = Streams::NONE;
    let mut assign = |stream: Streams, varying: bool| {
        if varying {
            animated |= stream;
        } else {
            constant |= stream;
        }
    };

    assign(Streams::POSITIONS, variation.positions);
    assign(Streams::TEXCOORDS, variation.texcoords);
    assign(
        Streams::QTANGENTS,
        variation.normals || variation.positions || variation.texcoords,
    );
    if has_colors {
        assign(Streams::COLORS, variation.colors);
    }

    Ok((constant, animated))
}

/// Float vertex data of one mesh at one tick, in ingestion vertex order.
///
/// Empty `texcoords` or `tangent_frames` mean the attribute is missing and
/// zeros or identity frames are written instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshFrameInput {
    pub positions: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub tangent_frames: Vec<TangentFrame>,
    pub colors: Option<Vec<[f32; 4]>>,
}

impl MeshFrameInput {
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }
}

/// Static description of an ingested mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshSource {
    pub name: String,
    /// Content digest computed by ingestion, used for mesh sharing.
    pub hash: u64,
    /// Triangle lists keyed by material id.
    pub indices: BTreeMap<u16, Vec<u32>>,
    pub variation: StreamVariation,
    /// Bounds over all ticks. Empty means "use the first tick".
    pub aabb: Aabb,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    name: String,
    hash: u64,
    constant_streams: Streams,
    animated_streams: Streams,
    position_bits: [u8; 3],
    uv_max: f32,
    aabb: Aabb,
    indices: BTreeMap<u16, Vec<u32>>,
    static_data: MeshFrameData,
    reflections: Vec<bool>,
    predictor: Option<MeshPredictor>,
    /// New vertex `i` is ingestion vertex `vertex_order[i]`.
    vertex_order: Vec<u32>,
    quantizer: PositionQuantizer,
    has_colors: bool,
    has_texcoords: bool,
    has_tangents: bool,
}

impl Mesh {
    /// Compiles a mesh from its source description and tick-0 data.
    ///
    /// Contract violations return `InvalidMesh` or `UnsupportedFeature`; the
    /// caller skips the mesh.
    pub fn build(source: &MeshSource, first_frame: &MeshFrameInput, options: &EncoderOptions) -> StatusResult<Mesh> {
        let num_vertices = first_frame.num_vertices();
        let has_colors = first_frame.colors.is_some();
        validate(source, first_frame, options)?;

        let (constant_streams, animated_streams) = classify_streams(source.variation, has_colors)?;

        let has_texcoords = !first_frame.texcoords.is_empty();
        let has_tangents = !first_frame.tangent_frames.is_empty();
        if !has_texcoords {
            warn!("Mesh '{}' has no texcoords", source.name);
        }
        if !has_tangents {
            warn!("Mesh '{}' has no normals, writing identity tangent frames", source.name);
        }

        let (vertex_order, indices) = if animated_streams.is_empty() {
            ((0..num_vertices as u32).collect(), source.indices.clone())
        } else {
            reorder_vertices_by_first_use(&source.indices, num_vertices)
        };

        let aabb = if source.aabb.is_empty() {
            if animated_streams.contains(Streams::POSITIONS) {
                warn!(
                    "Mesh '{}' has animated positions but no bounds over all ticks; positions outside tick 0 bounds are clamped",
                    source.name
                );
            }
            Aabb::from_points(&first_frame.positions)
        } else {
            source.aabb
        };
        let position_bits = position_bits_for_precision(&aabb, options.position_precision());
        let uv_max = options.uv_max().resolve(&first_frame.texcoords);

        let mut mesh = Mesh {
            name: source.name.clone(),
            hash: source.hash,
            constant_streams,
            animated_streams,
            position_bits,
            uv_max,
            aabb,
            indices,
            static_data: MeshFrameData::default(),
            reflections: Vec::new(),
            predictor: None,
            vertex_order,
            quantizer: PositionQuantizer::new(&aabb, position_bits),
            has_colors,
            has_texcoords,
            has_tangents,
        };

        let (static_data, reflections) = mesh.quantize(first_frame, None)?;
        mesh.static_data = static_data;
        mesh.reflections = reflections;

        if options.use_mesh_prediction() && !animated_streams.is_empty() {
            let predictor = MeshPredictor::build(
                mesh.indices.values().map(Vec::as_slice),
                &mesh.static_data.positions,
            );
            let hit_rate = predictor.hit_rate();
            if predictor.has_low_hit_rate() {
                warn!(
                    "Mesh '{}': only {:.1}% of vertices have a parallelogram predictor",
                    mesh.name,
                    hit_rate * 100.0
                );
            } else {
                debug!("Mesh '{}': predictor hit rate {:.1}%", mesh.name, hit_rate * 100.0);
            }
            mesh.predictor = Some(predictor);
        }

        Ok(mesh)
    }

    /// Quantizes a later tick into the compiled vertex order.
    pub fn quantize_frame(&self, input: &MeshFrameInput) -> StatusResult<MeshFrameData> {
        if input.num_vertices() != self.num_vertices() {
            return Err(GeomCacheError::InvalidMesh(format!(
                "mesh '{}' frame has {} vertices, expected {}",
                self.name,
                input.num_vertices(),
                self.num_vertices()
            )));
        }
        check_stream_lengths(&self.name, input, self.has_texcoords, self.has_tangents, self.has_colors)?;
        let (data, _) = self.quantize(input, Some(&self.reflections))?;
        Ok(data)
    }

    fn quantize(&self, input: &MeshFrameInput, reflections: Option<&[bool]>) -> StatusResult<(MeshFrameData, Vec<bool>)> {
        let num_vertices = self.vertex_order.len();
        let mut data = MeshFrameData::with_vertices(num_vertices, self.has_colors);
        let mut out_reflections = Vec::with_capacity(num_vertices);

        for (new, &old) in self.vertex_order.iter().enumerate() {
            let old = old as usize;

            let p = self.quantizer.quantize(input.positions[old]);
            data.positions[new * 3..new * 3 + 3].copy_from_slice(&p);

            if self.has_texcoords {
                let uv = quantize_texcoord(input.texcoords[old], self.uv_max);
                data.texcoords[new * 2..new * 2 + 2].copy_from_slice(&uv);
            }

            let frame = if self.has_tangents {
                input.tangent_frames[old]
            } else {
                TangentFrame::default()
            };
            let reference = reflections.map(|r| r[new]);
            let (q, reflected) = encode_qtangent_with_reflection(&frame, reference);
            data.qtangents[new * 4..new * 4 + 4].copy_from_slice(&q);
            out_reflections.push(reflected);

            if let Some(colors) = &input.colors {
                let rgba = colors[old];
                for channel in 0..4 {
                    data.colors[channel][new] = quantize_color(rgba[channel]);
                }
            }
        }

        Ok((data, out_reflections))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn constant_streams(&self) -> Streams {
        self.constant_streams
    }

    pub fn animated_streams(&self) -> Streams {
        self.animated_streams
    }

    pub fn is_animated(&self) -> bool {
        !self.animated_streams.is_empty()
    }

    pub fn position_bits(&self) -> [u8; 3] {
        self.position_bits
    }

    pub fn uv_max(&self) -> f32 {
        self.uv_max
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn num_vertices(&self) -> usize {
        self.vertex_order.len()
    }

    pub fn indices(&self) -> &BTreeMap<u16, Vec<u32>> {
        &self.indices
    }

    pub fn static_data(&self) -> &MeshFrameData {
        &self.static_data
    }

    pub fn reflections(&self) -> &[bool] {
        &self.reflections
    }

    pub fn predictor(&self) -> Option<&MeshPredictor> {
        self.predictor.as_ref()
    }

    pub fn vertex_order(&self) -> &[u32] {
        &self.vertex_order
    }

    /// True when the static records of both meshes would be identical and
    /// neither has animated streams.
    pub fn can_share_with(&self, other: &Mesh) -> bool {
        !self.is_animated()
            && !other.is_animated()
            && self.hash == other.hash
            && self.constant_streams == other.constant_streams
    }

    /// Writes the static mesh record.
    pub fn encode_static(&self, buffer: &mut EncoderBuffer, use_32bit_indices: bool) {
        let flags = if self.predictor.is_some() { MESH_FLAG_USE_PREDICTOR } else { 0 };

        buffer.encode_u8(self.constant_streams.bits());
        buffer.encode_u8(self.animated_streams.bits());
        buffer.encode_u8(flags);
        buffer.encode_u8(0);
        buffer.encode_bytes(&self.position_bits);
        buffer.encode_u8(0);
        buffer.encode_f32(self.uv_max);
        buffer.encode_u32(self.num_vertices() as u32);
        buffer.encode_u32(self.indices.len() as u32);
        buffer.encode_u32(self.name.len() as u32);
        buffer.encode_u64(self.hash);
        buffer.encode_f32_slice(&self.aabb.to_floats());
        buffer.encode_bytes(self.name.as_bytes());

        for &material_id in self.indices.keys() {
            buffer.encode_u16(material_id);
        }
        for indices in self.indices.values() {
            buffer.encode_u32(indices.len() as u32);
        }
        for indices in self.indices.values() {
            for &index in indices {
                if use_32bit_indices {
                    buffer.encode_u32(index);
                } else {
                    buffer.encode_u16(index as u16);
                }
            }
        }

        self.static_data.encode_streams(self.constant_streams, buffer);

        if let Some(predictor) = &self.predictor {
            predictor.encode(buffer);
        }
    }
}

fn validate(source: &MeshSource, first_frame: &MeshFrameInput, options: &EncoderOptions) -> StatusResult<()> {
    let num_vertices = first_frame.num_vertices();
    let invalid = |msg: String| GeomCacheError::InvalidMesh(format!("mesh '{}': {}", source.name, msg));

    if !options.use_32bit_indices() && num_vertices > MAX_VERTICES_16BIT_INDICES {
        return Err(GeomCacheError::UnsupportedFeature(format!(
            "mesh '{}' has {} vertices, more than {} need 32 bit indices",
            source.name, num_vertices, MAX_VERTICES_16BIT_INDICES
        )));
    }

    for (material_id, indices) in &source.indices {
        if indices.len() % 3 != 0 {
            return Err(invalid(format!(
                "material {} index count {} is not a multiple of 3",
                material_id,
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= num_vertices) {
            return Err(invalid(format!("index {} out of range for {} vertices", bad, num_vertices)));
        }
    }

    check_stream_lengths(
        &source.name,
        first_frame,
        !first_frame.texcoords.is_empty(),
        !first_frame.tangent_frames.is_empty(),
        first_frame.colors.is_some(),
    )
}

fn check_stream_lengths(
    name: &str,
    input: &MeshFrameInput,
    has_texcoords: bool,
    has_tangents: bool,
    has_colors: bool,
) -> StatusResult<()> {
    let n = input.num_vertices();
    let colors_len = input.colors.as_ref().map(Vec::len);
    let ok = (!has_texcoords || input.texcoords.len() == n)
        && (!has_tangents || input.tangent_frames.len() == n)
        && (if has_colors { colors_len == Some(n) } else { colors_len.is_none() });
    if ok {
        Ok(())
    } else {
        Err(GeomCacheError::InvalidMesh(format!(
            "mesh '{}': vertex stream lengths do not match {} positions",
            name, n
        )))
    }
}

/// Renumbers vertices in order of first use in the index buffers.
///
/// Materials are visited in id order; unreferenced vertices keep their
/// relative order at the end. Returns the new-to-old order and the remapped
/// index buffers.
pub fn reorder_vertices_by_first_use(
    indices: &BTreeMap<u16, Vec<u32>>,
    num_vertices: usize,
) -> (Vec<u32>, BTreeMap<u16, Vec<u32>>) {
    const UNASSIGNED: u32 = u32::MAX;
    let mut old_to_new = vec![UNASSIGNED; num_vertices];
    let mut order = Vec::with_capacity(num_vertices);

    for buffer in indices.values() {
        for &old in buffer {
            let slot = &mut old_to_new[old as usize];
            if *slot == UNASSIGNED {
                *slot = order.len() as u32;
                order.push(old);
            }
        }
    }
    for (old, slot) in old_to_new.iter_mut().enumerate() {
        if *slot == UNASSIGNED {
            *slot = order.len() as u32;
            order.push(old as u32);
        }
    }

    let remapped = indices
        .iter()
        .map(|(&material, buffer)| (material, buffer.iter().map(|&i| old_to_new[i as usize]).collect()))
        .collect();
    (order, remapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_format::Streams;

    fn triangle_source(variation: StreamVariation) -> (MeshSource, MeshFrameInput) {
        let mut indices = BTreeMap::new();
        indices.insert(1u16, vec![2, 0, 1]);
        let source = MeshSource {
            name: "tri".to_string(),
            hash: 42,
            indices,
            variation,
            aabb: Aabb::empty(),
        };
        let input = MeshFrameInput {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            texcoords: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            tangent_frames: vec![TangentFrame::default(); 3],
            colors: None,
        };
        (source, input)
    }

    #[test]
    fn test_classify_streams() {
        let (constant, animated) = classify_streams(
            StreamVariation {
                positions: true,
                ..Default::default()
            },
            false,
        )
        .unwrap();
        assert_eq!(constant, Streams::INDICES | Streams::TEXCOORDS);
        assert_eq!(animated, Streams::POSITIONS | Streams::QTANGENTS);

        let (constant, animated) = classify_streams(StreamVariation::default(), true).unwrap();
        assert!(animated.is_empty());
        assert!(constant.contains(Streams::COLORS | Streams::QTANGENTS));

        let (_, animated) = classify_streams(
            StreamVariation {
                normals: true,
                ..Default::default()
            },
            false,
        )
        .unwrap();
        assert_eq!(animated, Streams::QTANGENTS);

        let err = classify_streams(
            StreamVariation {
                indices: true,
                ..Default::default()
            },
            false,
        )
        .unwrap_err();
        assert!(err.is_mesh_local());
    }

    #[test]
    fn test_reorder_by_first_use() {
        let mut indices = BTreeMap::new();
        indices.insert(3u16, vec![4, 2, 0]);
        indices.insert(1u16, vec![2, 3, 4]);
        let (order, remapped) = reorder_vertices_by_first_use(&indices, 6);
        assert_eq!(order, vec![2, 3, 4, 0, 1, 5]);
        assert_eq!(remapped[&1], vec![0, 1, 2]);
        assert_eq!(remapped[&3], vec![2, 0, 3]);
    }

    #[test]
    fn test_build_animated_mesh_reorders() {
        let (source, input) = triangle_source(StreamVariation {
            positions: true,
            ..Default::default()
        });
        let mesh = Mesh::build(&source, &input, &EncoderOptions::default()).unwrap();
        assert_eq!(mesh.vertex_order(), &[2, 0, 1]);
        assert_eq!(mesh.indices()[&1], vec![0, 1, 2]);
        // new vertex 0 is the old (0, 1, 0)
        assert_eq!(mesh.static_data().position(0), [0, 65535, 0]);
        assert!(mesh.predictor().is_some());

        let later = mesh.quantize_frame(&input).unwrap();
        assert_eq!(&later, mesh.static_data());
    }

    #[test]
    fn test_constant_mesh_keeps_order_and_has_no_predictor() {
        let (source, input) = triangle_source(StreamVariation::default());
        let mesh = Mesh::build(&source, &input, &EncoderOptions::default()).unwrap();
        assert_eq!(mesh.vertex_order(), &[0, 1, 2]);
        assert!(mesh.predictor().is_none());
        assert!(!mesh.is_animated());
        assert!(mesh.can_share_with(&mesh.clone()));
    }

    #[test]
    fn test_invalid_meshes() {
        let (mut source, input) = triangle_source(StreamVariation::default());
        source.indices.insert(2, vec![0, 1]);
        assert!(matches!(
            Mesh::build(&source, &input, &EncoderOptions::default()),
            Err(GeomCacheError::InvalidMesh(_))
        ));

        let (mut source, input) = triangle_source(StreamVariation::default());
        source.indices.insert(2, vec![0, 1, 7]);
        assert!(Mesh::build(&source, &input, &EncoderOptions::default()).is_err());

        let (source, mut input) = triangle_source(StreamVariation::default());
        input.texcoords.pop();
        assert!(Mesh::build(&source, &input, &EncoderOptions::default()).is_err());
    }

    #[test]
    fn test_too_many_vertices_for_16bit_indices() {
        let (mut source, mut input) = triangle_source(StreamVariation::default());
        input.positions = vec![[0.0; 3]; MAX_VERTICES_16BIT_INDICES + 1];
        input.texcoords.clear();
        input.tangent_frames.clear();
        let err = Mesh::build(&source, &input, &EncoderOptions::default()).unwrap_err();
        assert!(matches!(err, GeomCacheError::UnsupportedFeature(_)));

        source.name = "big".to_string();
        let options = EncoderOptions::default().with_32bit_indices(true);
        assert!(Mesh::build(&source, &input, &options).is_ok());
    }

    #[test]
    fn test_static_record_layout() {
        let (source, input) = triangle_source(StreamVariation::default());
        let mesh = Mesh::build(&source, &input, &EncoderOptions::default()).unwrap();
        let mut buffer = EncoderBuffer::new();
        mesh.encode_static(&mut buffer, false);
        let data = buffer.data();
        assert_eq!(data[0], (Streams::INDICES | Streams::POSITIONS | Streams::TEXCOORDS | Streams::QTANGENTS).bits());
        assert_eq!(data[1], 0);
        assert_eq!(&data[4..7], &[16, 16, 16]);
        let header = 4 + 4 + 4 + 4 + 4 + 4 + 8 + 24;
        assert_eq!(&data[header..header + 3], b"tri");
        // material id, index count, 3 u16 indices, 3 vertices * (6 + 4 + 8) bytes
        assert_eq!(data.len(), header + 3 + 2 + 4 + 6 + 3 * 18);
    }
}
