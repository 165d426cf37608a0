use crate::file_format::{BlockCompressionFormat, DEFAULT_INDEX_FRAME_DISTANCE, MAX_INDEX_FRAME_DISTANCE};
use crate::quantization_utils::{PositionPrecision, UvMax};
use crate::status::{GeomCacheError, Status};

/// Cache-wide encoder configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOptions {
    block_compression_format: BlockCompressionFormat,
    use_b_frames: bool,
    index_frame_distance: u32,
    use_32bit_indices: bool,
    position_precision: PositionPrecision,
    uv_max: UvMax,
    use_mesh_prediction: bool,
    playback_from_memory: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            block_compression_format: BlockCompressionFormat::Deflate,
            use_b_frames: true,
            index_frame_distance: DEFAULT_INDEX_FRAME_DISTANCE,
            use_32bit_indices: false,
            position_precision: PositionPrecision::Max,
            uv_max: UvMax::Auto,
            use_mesh_prediction: true,
            playback_from_memory: false,
        }
    }
}

impl EncoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_compression_format(mut self, format: BlockCompressionFormat) -> Self {
        self.block_compression_format = format;
        self
    }

    pub fn with_b_frames(mut self, use_b_frames: bool) -> Self {
        self.use_b_frames = use_b_frames;
        self
    }

    /// Distance between I-frames, clamped to `[1, MAX_INDEX_FRAME_DISTANCE]`.
    pub fn with_index_frame_distance(mut self, distance: u32) -> Self {
        self.index_frame_distance = distance.clamp(1, MAX_INDEX_FRAME_DISTANCE);
        self
    }

    pub fn with_32bit_indices(mut self, use_32bit_indices: bool) -> Self {
        self.use_32bit_indices = use_32bit_indices;
        self
    }

    pub fn with_position_precision(mut self, precision: PositionPrecision) -> Self {
        self.position_precision = precision;
        self
    }

    pub fn with_uv_max(mut self, uv_max: UvMax) -> Self {
        self.uv_max = uv_max;
        self
    }

    pub fn with_mesh_prediction(mut self, use_mesh_prediction: bool) -> Self {
        self.use_mesh_prediction = use_mesh_prediction;
        self
    }

    pub fn with_playback_from_memory(mut self, playback_from_memory: bool) -> Self {
        self.playback_from_memory = playback_from_memory;
        self
    }

    /// Sets an option from its textual config key and value.
    pub fn set_option(&mut self, key: &str, value: &str) -> Status {
        match key {
            "blockcompressionformat" => self.block_compression_format = value.parse()?,
            "bframes" => self.use_b_frames = parse_bool(key, value)?,
            "indexframedistance" => {
                let distance = value.trim().parse::<u32>().map_err(|_| invalid(key, value))?;
                self.index_frame_distance = distance.clamp(1, MAX_INDEX_FRAME_DISTANCE);
            }
            "32bitindices" => self.use_32bit_indices = parse_bool(key, value)?,
            "positionprecision" => self.position_precision = value.parse()?,
            "uvmax" => self.uv_max = value.parse()?,
            "meshprediction" => self.use_mesh_prediction = parse_bool(key, value)?,
            "playbackfrommemory" => self.playback_from_memory = parse_bool(key, value)?,
            _ => {
                return Err(GeomCacheError::InvalidParameter(format!("unknown option '{}'", key)));
            }
        }
        Ok(())
    }

    pub fn block_compression_format(&self) -> BlockCompressionFormat {
        self.block_compression_format
    }

    /// B-frames need a block compressor to pay off; store disables them.
    pub fn use_b_frames(&self) -> bool {
        self.use_b_frames && self.block_compression_format != BlockCompressionFormat::Store
    }

    pub fn index_frame_distance(&self) -> u32 {
        self.index_frame_distance
    }

    pub fn use_32bit_indices(&self) -> bool {
        self.use_32bit_indices
    }

    pub fn position_precision(&self) -> PositionPrecision {
        self.position_precision
    }

    pub fn uv_max(&self) -> UvMax {
        self.uv_max
    }

    /// Spatial prediction only helps a compressor; store disables it.
    pub fn use_mesh_prediction(&self) -> bool {
        self.use_mesh_prediction && self.block_compression_format != BlockCompressionFormat::Store
    }

    pub fn playback_from_memory(&self) -> bool {
        self.playback_from_memory
    }
}

fn invalid(key: &str, value: &str) -> GeomCacheError {
    GeomCacheError::InvalidParameter(format!("invalid value '{}' for option '{}'", value, key))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, GeomCacheError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = EncoderOptions::default();
        assert_eq!(options.block_compression_format(), BlockCompressionFormat::Deflate);
        assert!(options.use_b_frames());
        assert_eq!(options.index_frame_distance(), DEFAULT_INDEX_FRAME_DISTANCE);
        assert!(!options.use_32bit_indices());
        assert!(options.use_mesh_prediction());
    }

    #[test]
    fn test_store_disables_b_frames() {
        let options = EncoderOptions::new().with_block_compression_format(BlockCompressionFormat::Store);
        assert!(!options.use_b_frames());
        assert!(!options.use_mesh_prediction());
        assert!(EncoderOptions::new()
            .with_block_compression_format(BlockCompressionFormat::Lz4Hc)
            .use_mesh_prediction());
    }

    #[test]
    fn test_index_frame_distance_is_clamped() {
        assert_eq!(EncoderOptions::new().with_index_frame_distance(100).index_frame_distance(), 30);
        assert_eq!(EncoderOptions::new().with_index_frame_distance(0).index_frame_distance(), 1);
    }

    #[test]
    fn test_set_option() {
        let mut options = EncoderOptions::new();
        options.set_option("blockcompressionformat", "zstd").unwrap();
        options.set_option("indexframedistance", "45").unwrap();
        options.set_option("positionprecision", "0.1").unwrap();
        options.set_option("uvmax", "auto").unwrap();
        options.set_option("32bitindices", "1").unwrap();
        assert_eq!(options.block_compression_format(), BlockCompressionFormat::Zstd);
        assert_eq!(options.index_frame_distance(), 30);
        assert_eq!(options.position_precision(), PositionPrecision::Millimeters(0.1));
        assert!(options.use_32bit_indices());

        assert!(options.set_option("bframes", "maybe").is_err());
        assert!(options.set_option("nosuchoption", "1").is_err());
    }
}
