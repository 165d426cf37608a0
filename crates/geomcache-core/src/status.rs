use thiserror::Error;

/// Errors raised while building or encoding a geometry cache.
///
/// The variants follow the failure classes of the encoder: ingestion contract
/// violations (`InvalidMesh`, `UnsupportedFeature`) skip a single mesh,
/// codec invariant violations (`FrameSequence`) and output failures (`Io`,
/// `Compression`) abort the whole file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeomCacheError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),
    #[error("Frame sequence error: {0}")]
    FrameSequence(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Status = Result<(), GeomCacheError>;

pub type StatusResult<T> = Result<T, GeomCacheError>;

impl From<std::io::Error> for GeomCacheError {
    fn from(err: std::io::Error) -> Self {
        GeomCacheError::Io(err.to_string())
    }
}

impl GeomCacheError {
    /// True for failures that only invalidate one mesh, not the output file.
    pub fn is_mesh_local(&self) -> bool {
        matches!(self, GeomCacheError::InvalidMesh(_) | GeomCacheError::UnsupportedFeature(_))
    }
}
