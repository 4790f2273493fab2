use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("project id must be positive, got {0}")]
    InvalidProjectId(i64),
    #[error("layer id must be positive, got {0}")]
    InvalidLayerId(i64),
    #[error("invalid export scale {0:?}, expected a value like \"2x\"")]
    InvalidScale(String),
    #[error("unknown layer type {0:?}")]
    UnknownLayerKind(String),
    #[error("unknown project status {0:?}")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RasterError {
    #[error("layer is completely outside the canvas")]
    OutsideCanvas,
}
