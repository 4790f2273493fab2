pub mod fs;
pub mod migrations;
pub mod presenters;
#[cfg(feature = "psd")]
pub mod psd;
pub mod sqlite;

pub use fs::{FsAssetWriter, SystemClock};
pub use presenters::{present_export_summary, present_layer_row, present_project};
#[cfg(feature = "psd")]
pub use psd::PsdCrateRenderer;
pub use sqlite::SqliteProjectRepository;

use std::path::Path;

use psd2img_application::{ApplicationError, Document, DocumentRenderer};

/// Stand-in used when the binary is built without a PSD decoder.
#[derive(Debug, Default)]
pub struct UnavailableRenderer;

impl DocumentRenderer for UnavailableRenderer {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, ApplicationError> {
        Err(ApplicationError::Decode(format!(
            "cannot decode {}: rebuild with `cargo build --features psd` to enable PSD decoding",
            path.display()
        )))
    }
}
