use std::path::{Path, PathBuf};

use image::RgbaImage;
use log::{debug, error, warn};
use psd2img_domain::raster::{self, Placed, TransparencyBounds};
use psd2img_domain::{
    sanitize_filename, ExportScale, LayerId, LayerKind, ProcessingMode, ProjectId, RasterError,
    Rect,
};
use serde_json::{json, Map, Value};

use crate::{
    ApplicationError, AssetWriter, CancellationToken, Document, DocumentNode, NewLayer,
    ProjectStore,
};

/// Where and how one project's rasters are written.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub project_id: ProjectId,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub mode: ProcessingMode,
    pub scales: Vec<ExportScale>,
    /// Absolute directory the asset writer fills.
    pub output_dir: PathBuf,
    /// Prefix stored on records, e.g. `processed/3`.
    pub relative_dir: String,
}

impl ExportSettings {
    pub fn stored_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.relative_dir, file_name)
    }

    fn scale_labels(&self) -> Vec<String> {
        self.scales.iter().map(ToString::to_string).collect()
    }
}

pub fn classify(node: &DocumentNode) -> LayerKind {
    if node.is_text_layer() {
        LayerKind::Text
    } else if node.is_group {
        LayerKind::Group
    } else {
        LayerKind::Layer
    }
}

/// Transient per-node state; narrowed by clipping and trimming, then consumed
/// into exactly one [`NewLayer`].
#[derive(Debug, Clone)]
struct ExportAttributes {
    resource_id: String,
    name: String,
    kind: LayerKind,
    bounds: Rect,
    content: Option<String>,
    image_path: String,
    metadata: Map<String, Value>,
    parent_id: Option<LayerId>,
    hidden: bool,
}

impl ExportAttributes {
    fn for_node(
        node: &DocumentNode,
        settings: &ExportSettings,
        parent_id: Option<LayerId>,
    ) -> Self {
        let mut metadata = Map::new();
        metadata.insert("scales".to_string(), json!(settings.scale_labels()));
        metadata.insert("opacity".to_string(), json!(node.opacity));
        metadata.insert("blend_mode".to_string(), json!(node.blend_mode));
        if node.mask.is_some() {
            metadata.insert("has_mask".to_string(), json!(true));
        }

        Self {
            resource_id: format!("node_{}", node.id),
            name: node.name.clone(),
            kind: classify(node),
            bounds: node.bounds,
            content: None,
            image_path: String::new(),
            metadata,
            parent_id,
            hidden: !node.visible,
        }
    }

    fn into_new_layer(self, project_id: ProjectId) -> NewLayer {
        NewLayer {
            project_id,
            resource_id: self.resource_id,
            name: self.name,
            kind: self.kind,
            bounds: self.bounds,
            content: self.content,
            image_path: self.image_path,
            metadata_json: Value::Object(self.metadata).to_string(),
            parent_id: self.parent_id,
            hidden: self.hidden,
        }
    }
}

/// Depth-first pre-order walk over a document tree, writing one raster set and
/// one record per exportable node. Node-level failures are logged and skipped;
/// only cancellation stops the walk early.
pub struct LayerExporter<'a> {
    settings: &'a ExportSettings,
    document: &'a dyn Document,
    store: &'a dyn ProjectStore,
    assets: &'a dyn AssetWriter,
    token: &'a CancellationToken,
    exported: usize,
}

impl<'a> LayerExporter<'a> {
    pub fn new(
        settings: &'a ExportSettings,
        document: &'a dyn Document,
        store: &'a dyn ProjectStore,
        assets: &'a dyn AssetWriter,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            settings,
            document,
            store,
            assets,
            token,
            exported: 0,
        }
    }

    /// Walks every child of the root sentinel and returns how many records
    /// were written. Returns `Cancelled` when the token fired mid-walk.
    pub fn export_tree(mut self) -> Result<usize, ApplicationError> {
        let document = self.document;
        let root = document.tree();
        for child in &root.children {
            self.visit(child, None);
        }
        self.token.check()?;
        Ok(self.exported)
    }

    fn visit(&mut self, node: &DocumentNode, parent_id: Option<LayerId>) {
        if self.token.is_cancelled() {
            return;
        }

        let record_id = match classify(node) {
            LayerKind::Group => self.export_group(node, parent_id),
            kind => {
                if node.bounds.width <= 0 || node.bounds.height <= 0 {
                    debug!("skipping empty {kind} {:?}", node.name);
                    return;
                }
                let record_id = if kind == LayerKind::Text {
                    self.export_text(node, parent_id)
                } else {
                    self.export_layer(node, parent_id)
                };
                // a failed leaf takes its subtree with it
                if record_id.is_none() {
                    return;
                }
                record_id
            }
        };

        let child_parent = record_id.or(parent_id);
        for child in &node.children {
            self.visit(child, child_parent);
        }
    }

    fn export_group(
        &mut self,
        node: &DocumentNode,
        parent_id: Option<LayerId>,
    ) -> Option<LayerId> {
        let mut attrs = ExportAttributes::for_node(node, self.settings, parent_id);

        let with_text = match self.document.render(node) {
            Ok(image) => image,
            Err(error) => {
                warn!("group {:?} failed to render, storing placeholder: {error}", node.name);
                attrs.parent_id = None;
                return self.persist(attrs);
            }
        };

        let placed = self.place(with_text, &mut attrs)?;
        let (placed, trim_bounds) = self.trim_if_aggressive(placed, &mut attrs)?;

        let safe_name = sanitize_filename(&node.name);
        let suffix = random_suffix();
        let with_text_file = format!("group_{safe_name}_with_text_{suffix}.png");
        attrs.image_path = self.save(&placed.image, &with_text_file, &attrs)?;

        if let Some(no_text) = self.group_without_text(node, trim_bounds.as_ref()) {
            let no_text_file = format!("group_{safe_name}_no_text_{suffix}.png");
            if let Some(path) = self.save(&no_text, &no_text_file, &attrs) {
                attrs
                    .metadata
                    .insert("image_path_no_text".to_string(), json!(path));
            }
        }

        self.persist(attrs)
    }

    /// Same placement and crop as the with-text variant, so the two images
    /// line up pixel for pixel.
    fn group_without_text(
        &self,
        node: &DocumentNode,
        trim_bounds: Option<&TransparencyBounds>,
    ) -> Option<RgbaImage> {
        let image = match self.document.render_without_text(node) {
            Ok(image) => image,
            Err(error) => {
                debug!("no text-free variant for group {:?}: {error}", node.name);
                return None;
            }
        };
        let placed = raster::clip_to_canvas(
            image,
            node.bounds.x,
            node.bounds.y,
            self.settings.canvas_width,
            self.settings.canvas_height,
        )
        .ok()?;
        Some(match trim_bounds {
            Some(bounds) => raster::trim(placed.image, bounds),
            None => placed.image,
        })
    }

    fn export_text(
        &mut self,
        node: &DocumentNode,
        parent_id: Option<LayerId>,
    ) -> Option<LayerId> {
        let mut attrs = ExportAttributes::for_node(node, self.settings, parent_id);
        if let Some(payload) = &node.text {
            attrs.content = Some(payload.content.clone());
            if let Some(info) = &payload.info {
                attrs.metadata.insert("fonts".to_string(), json!(info.fonts));
                attrs
                    .metadata
                    .insert("font_sizes".to_string(), json!(info.sizes));
            }
        }

        let image = match self.document.render(node) {
            Ok(image) => image,
            Err(error) => {
                debug!("rich render of text {:?} failed, using pixels: {error}", node.name);
                match self.document.render_pixels(node) {
                    Ok(image) => image,
                    Err(error) => {
                        error!("failed to render text {:?}: {error}", node.name);
                        return None;
                    }
                }
            }
        };

        self.export_raster(image, "text", attrs)
    }

    fn export_layer(
        &mut self,
        node: &DocumentNode,
        parent_id: Option<LayerId>,
    ) -> Option<LayerId> {
        let attrs = ExportAttributes::for_node(node, self.settings, parent_id);
        let image = match self.document.render_pixels(node) {
            Ok(image) => image,
            Err(error) => {
                error!("failed to render layer {:?}: {error}", node.name);
                return None;
            }
        };
        self.export_raster(image, "layer", attrs)
    }

    fn export_raster(
        &mut self,
        image: RgbaImage,
        prefix: &str,
        mut attrs: ExportAttributes,
    ) -> Option<LayerId> {
        let placed = self.place(image, &mut attrs)?;
        let (placed, _) = self.trim_if_aggressive(placed, &mut attrs)?;
        let file_name = format!(
            "{prefix}_{}_{}.png",
            sanitize_filename(&attrs.name),
            random_suffix()
        );
        attrs.image_path = self.save(&placed.image, &file_name, &attrs)?;
        self.persist(attrs)
    }

    fn place(&self, image: RgbaImage, attrs: &mut ExportAttributes) -> Option<Placed> {
        match raster::clip_to_canvas(
            image,
            attrs.bounds.x,
            attrs.bounds.y,
            self.settings.canvas_width,
            self.settings.canvas_height,
        ) {
            Ok(placed) => {
                attrs.bounds = placed.bounds();
                Some(placed)
            }
            Err(RasterError::OutsideCanvas) => {
                debug!("skipping {} {:?}: outside canvas", attrs.kind, attrs.name);
                None
            }
        }
    }

    fn trim_if_aggressive(
        &self,
        placed: Placed,
        attrs: &mut ExportAttributes,
    ) -> Option<(Placed, Option<TransparencyBounds>)> {
        if !self.settings.mode.trims_transparency() {
            return Some((placed, None));
        }
        let bounds = raster::analyze_transparency(&placed.image);
        if !bounds.found_opaque {
            debug!("skipping {} {:?}: fully transparent", attrs.kind, attrs.name);
            return None;
        }
        let trimmed = raster::trim_placed(placed, &bounds);
        if trimmed.bounds() != attrs.bounds {
            debug!(
                "trimmed {:?} from {:?} to {:?}",
                attrs.name,
                attrs.bounds,
                trimmed.bounds()
            );
        }
        attrs.bounds = trimmed.bounds();
        Some((trimmed, Some(bounds)))
    }

    fn save(
        &self,
        image: &RgbaImage,
        file_name: &str,
        attrs: &ExportAttributes,
    ) -> Option<String> {
        match self.assets.save_scaled_variants(
            image,
            &self.settings.output_dir,
            file_name,
            &self.settings.scales,
        ) {
            Ok(canonical) => Some(self.settings.stored_path(&canonical)),
            Err(error) => {
                error!("failed to save {} {:?}: {error}", attrs.kind, attrs.name);
                None
            }
        }
    }

    fn persist(&mut self, attrs: ExportAttributes) -> Option<LayerId> {
        let name = attrs.name.clone();
        let kind = attrs.kind;
        match self
            .store
            .create_layer(&attrs.into_new_layer(self.settings.project_id))
        {
            Ok(id) => {
                self.exported += 1;
                debug!("stored {kind} {name:?} as record {id}");
                Some(id)
            }
            Err(error) => {
                error!("failed to store {kind} {name:?}: {error}");
                None
            }
        }
    }
}

fn random_suffix() -> String {
    format!("{:08x}", rand::random::<u32>())
}

pub(crate) fn output_dir(public_root: &Path, project_id: ProjectId) -> (PathBuf, String) {
    let relative = format!("processed/{project_id}");
    (public_root.join("processed").join(project_id.to_string()), relative)
}
