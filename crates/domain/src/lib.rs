mod error;
mod layer;
mod naming;
mod project;
pub mod raster;

pub use error::{DomainError, RasterError};
pub use layer::{LayerId, LayerKind, LayerRecord, Rect};
pub use naming::{
    is_supported_document, sanitize_filename, scaled_filename, short_digest, slice_filename,
    DOCUMENT_EXTENSIONS, MAX_FILENAME_CHARS,
};
pub use project::{ExportScale, ProcessingMode, Project, ProjectId, ProjectStatus};
pub use raster::{Placed, TransparencyBounds};
