use std::path::Path;

use image::RgbaImage;
use psd2img_domain::{
    ExportScale, LayerId, LayerKind, LayerRecord, ProcessingMode, Project, ProjectId, Rect,
};

use crate::ApplicationError;

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub psd_path: String,
    pub export_path: String,
    pub processing_mode: ProcessingMode,
    pub export_scales: Vec<ExportScale>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLayer {
    pub project_id: ProjectId,
    pub resource_id: String,
    pub name: String,
    pub kind: LayerKind,
    pub bounds: Rect,
    pub content: Option<String>,
    pub image_path: String,
    pub metadata_json: String,
    pub parent_id: Option<LayerId>,
    pub hidden: bool,
}

/// Durable project and layer records. Implementations must be usable from
/// several export jobs at once; each call is expected to be atomic on its own.
pub trait ProjectStore: Send + Sync {
    fn initialize(&self) -> Result<(), ApplicationError>;

    fn create_project(&self, project: &NewProject) -> Result<ProjectId, ApplicationError>;

    fn find_project(&self, project_id: ProjectId) -> Result<Option<Project>, ApplicationError>;

    fn update_project(&self, project: &Project) -> Result<(), ApplicationError>;

    fn delete_project(&self, project_id: ProjectId) -> Result<(), ApplicationError>;

    /// A layer's parent, when set, must already have been created.
    fn create_layer(&self, layer: &NewLayer) -> Result<LayerId, ApplicationError>;

    fn list_layers(&self, project_id: ProjectId) -> Result<Vec<LayerRecord>, ApplicationError>;

    fn delete_layers(&self, project_id: ProjectId) -> Result<usize, ApplicationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentHeader {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceInfo {
    pub id: u32,
    pub name: String,
    pub bounds: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextInfo {
    pub fonts: Vec<String>,
    pub sizes: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextPayload {
    pub content: String,
    pub info: Option<TextInfo>,
}

/// One entry of a decoded document's layer tree. Each node owns its children;
/// the root returned by [`Document::tree`] is a sentinel with no pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    pub id: String,
    pub name: String,
    pub is_group: bool,
    pub visible: bool,
    pub opacity: u8,
    pub blend_mode: String,
    pub bounds: Rect,
    pub text: Option<TextPayload>,
    pub mask: Option<String>,
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    pub fn root(children: Vec<DocumentNode>) -> Self {
        Self {
            children,
            ..Self::group("root", "", Rect::default(), Vec::new())
        }
    }

    pub fn group(id: &str, name: &str, bounds: Rect, children: Vec<DocumentNode>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            is_group: true,
            visible: true,
            opacity: 255,
            blend_mode: "normal".to_string(),
            bounds,
            text: None,
            mask: None,
            children,
        }
    }

    pub fn layer(id: &str, name: &str, bounds: Rect) -> Self {
        Self {
            is_group: false,
            ..Self::group(id, name, bounds, Vec::new())
        }
    }

    pub fn text(id: &str, name: &str, bounds: Rect, payload: TextPayload) -> Self {
        Self {
            text: Some(payload),
            ..Self::layer(id, name, bounds)
        }
    }

    pub fn is_text_layer(&self) -> bool {
        self.text.is_some()
    }
}

/// A decoded PSD/PSB document. Rendering may be expensive; callers render each
/// node at most a couple of times.
pub trait Document {
    fn header(&self) -> DocumentHeader;

    fn flattened_image(&self) -> Result<RgbaImage, ApplicationError>;

    fn slices(&self) -> Vec<SliceInfo>;

    fn tree(&self) -> &DocumentNode;

    /// Composite of the node including any text it contains.
    fn render(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError>;

    /// Composite of the node with text layers hidden. Best effort.
    fn render_without_text(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError>;

    /// The node's own pixel data without compositing.
    fn render_pixels(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError>;
}

pub trait DocumentRenderer: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, ApplicationError>;
}

pub trait AssetWriter: Send + Sync {
    /// Writes one file per scale and returns the canonical (1x, or first
    /// written) file name relative to `output_dir`. No files are left behind
    /// when any scale fails.
    fn save_scaled_variants(
        &self,
        image: &RgbaImage,
        output_dir: &Path,
        base_filename: &str,
        scales: &[ExportScale],
    ) -> Result<String, ApplicationError>;

    /// Writes `full_preview.<ext>`, preferring a lossy format and falling back
    /// to a lossless one. Returns the file name written.
    fn save_full_preview(
        &self,
        image: &RgbaImage,
        output_dir: &Path,
    ) -> Result<String, ApplicationError>;

    fn remove_dir(&self, dir: &Path) -> Result<(), ApplicationError>;

    /// Removing a file that does not exist is not an error.
    fn remove_file(&self, path: &Path) -> Result<(), ApplicationError>;

    /// Copies `source` to `target`, creating missing parent directories.
    /// Returns `false` without writing anything when `source` does not exist.
    fn copy_file(&self, source: &Path, target: &Path) -> Result<bool, ApplicationError>;
}

pub trait Clock: Send + Sync {
    fn now_timestamp_string(&self) -> String;
}
