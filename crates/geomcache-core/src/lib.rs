//! Geometry Cache Core Library
//!
//! Data model and predictors of the animated geometry cache encoder:
//! quantized vertex streams, compiled meshes and the scene tree, the spatial
//! parallelogram predictor, the entropy-searched temporal predictor and the
//! I/B frame schedule.

#![allow(clippy::needless_range_loop)]

// =============================================================================
// Format and configuration
// =============================================================================

pub mod encoder_options;
pub mod file_format;
pub mod status;

// =============================================================================
// Data model
// =============================================================================

pub mod encoder_buffer;
pub mod mesh;
pub mod node;
pub mod quantization_utils;
pub mod scene;
pub mod stream_data;
pub mod vector_extensions;

// =============================================================================
// Prediction
// =============================================================================

pub mod frame_schedule;
pub mod mesh_predictor;
pub mod shannon_entropy;
pub mod temporal_predictor;

pub use encoder_buffer::EncoderBuffer;
pub use encoder_options::EncoderOptions;
pub use file_format::{BlockCompressionFormat, FrameType, Streams, TransformType};
pub use frame_schedule::FrameSchedule;
pub use mesh::{Mesh, MeshFrameInput, MeshSource, StreamVariation};
pub use mesh_predictor::MeshPredictor;
pub use node::{Node, NodeFrame, NodeKind};
pub use quantization_utils::{PositionPrecision, TangentFrame, UvMax};
pub use scene::Scene;
pub use status::{GeomCacheError, Status, StatusResult};
pub use stream_data::{MeshFrameData, RawFrame, StreamKind};
pub use temporal_predictor::{PredictorControl, TemporalPredictor};
pub use vector_extensions::{Aabb, QuatTns, Quaternion, Vector3f};
