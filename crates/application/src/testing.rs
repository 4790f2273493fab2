//! In-memory fakes of every port, shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, MutexGuard};

use image::{Rgba, RgbaImage};
use psd2img_domain::{
    ExportScale, LayerId, LayerRecord, ProcessingMode, Project, ProjectId, ProjectStatus,
};

use crate::{
    ApplicationError, AssetWriter, Clock, Document, DocumentHeader, DocumentNode,
    DocumentRenderer, NewLayer, NewProject, ProjectStore, SliceInfo,
};

pub fn opaque(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([180, 40, 90, 255]))
}

pub fn transparent(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]))
}

/// Transparent `width` x `height` image with an opaque square covering the
/// inclusive range `from..=to` on both axes.
pub fn opaque_square(width: u32, height: u32, from: u32, to: u32) -> RgbaImage {
    let mut image = transparent(width, height);
    for y in from..=to {
        for x in from..=to {
            image.put_pixel(x, y, Rgba([10, 200, 10, 255]));
        }
    }
    image
}

pub fn project_fixture(mode: ProcessingMode) -> NewProject {
    NewProject {
        name: "fixture".to_string(),
        psd_path: "fixture.psd".to_string(),
        export_path: String::new(),
        processing_mode: mode,
        export_scales: vec![ExportScale::ONE],
    }
}

#[derive(Default)]
struct StoreState {
    next_project_id: i64,
    next_layer_id: i64,
    projects: HashMap<i64, Project>,
    layers: Vec<LayerRecord>,
    failing_layer_names: HashSet<String>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_layer(&self, name: &str) {
        self.lock().failing_layer_names.insert(name.to_string());
    }

    pub fn layers(&self) -> Vec<LayerRecord> {
        self.lock().layers.clone()
    }

    pub fn layer_named(&self, name: &str) -> Option<LayerRecord> {
        self.lock()
            .layers
            .iter()
            .find(|layer| layer.name == name)
            .cloned()
    }

    pub fn project(&self, project_id: ProjectId) -> Project {
        self.lock()
            .projects
            .get(&project_id.get())
            .cloned()
            .expect("project should exist")
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store lock")
    }
}

impl ProjectStore for InMemoryStore {
    fn initialize(&self) -> Result<(), ApplicationError> {
        Ok(())
    }

    fn create_project(&self, project: &NewProject) -> Result<ProjectId, ApplicationError> {
        let mut state = self.lock();
        state.next_project_id += 1;
        let id = ProjectId::new(state.next_project_id)?;
        state.projects.insert(
            id.get(),
            Project {
                id,
                name: project.name.clone(),
                psd_path: project.psd_path.clone(),
                export_path: project.export_path.clone(),
                status: ProjectStatus::Pending,
                width: 0,
                height: 0,
                processing_mode: project.processing_mode,
                export_scales: project.export_scales.clone(),
                processing_started_at: None,
                processing_finished_at: None,
            },
        );
        Ok(id)
    }

    fn find_project(&self, project_id: ProjectId) -> Result<Option<Project>, ApplicationError> {
        Ok(self.lock().projects.get(&project_id.get()).cloned())
    }

    fn update_project(&self, project: &Project) -> Result<(), ApplicationError> {
        self.lock().projects.insert(project.id.get(), project.clone());
        Ok(())
    }

    fn delete_project(&self, project_id: ProjectId) -> Result<(), ApplicationError> {
        let mut state = self.lock();
        state.projects.remove(&project_id.get());
        state.layers.retain(|layer| layer.project_id != project_id);
        Ok(())
    }

    fn create_layer(&self, layer: &NewLayer) -> Result<LayerId, ApplicationError> {
        let mut state = self.lock();
        if state.failing_layer_names.contains(&layer.name) {
            return Err(ApplicationError::Persistence(format!(
                "refusing to store {}",
                layer.name
            )));
        }
        if let Some(parent_id) = layer.parent_id {
            if !state.layers.iter().any(|existing| existing.id == parent_id) {
                return Err(ApplicationError::Persistence(format!(
                    "parent {parent_id} does not exist"
                )));
            }
        }
        state.next_layer_id += 1;
        let id = LayerId::new(state.next_layer_id)?;
        state.layers.push(LayerRecord {
            id,
            project_id: layer.project_id,
            resource_id: layer.resource_id.clone(),
            name: layer.name.clone(),
            kind: layer.kind,
            bounds: layer.bounds,
            content: layer.content.clone(),
            image_path: layer.image_path.clone(),
            metadata_json: layer.metadata_json.clone(),
            parent_id: layer.parent_id,
            hidden: layer.hidden,
        });
        Ok(id)
    }

    fn list_layers(&self, project_id: ProjectId) -> Result<Vec<LayerRecord>, ApplicationError> {
        Ok(self
            .lock()
            .layers
            .iter()
            .filter(|layer| layer.project_id == project_id)
            .cloned()
            .collect())
    }

    fn delete_layers(&self, project_id: ProjectId) -> Result<usize, ApplicationError> {
        let mut state = self.lock();
        let before = state.layers.len();
        state.layers.retain(|layer| layer.project_id != project_id);
        Ok(before - state.layers.len())
    }
}

/// Scripted document: every render result is looked up by node id, missing
/// entries fail with a render error.
pub struct FakeDocument {
    pub header: DocumentHeader,
    pub flattened: Option<RgbaImage>,
    pub slices: Vec<SliceInfo>,
    pub root: DocumentNode,
    pub composites: HashMap<String, RgbaImage>,
    pub without_text: HashMap<String, RgbaImage>,
    pub pixels: HashMap<String, RgbaImage>,
    pub render_calls: Mutex<Vec<String>>,
}

impl Clone for FakeDocument {
    fn clone(&self) -> Self {
        Self {
            header: self.header,
            flattened: self.flattened.clone(),
            slices: self.slices.clone(),
            root: self.root.clone(),
            composites: self.composites.clone(),
            without_text: self.without_text.clone(),
            pixels: self.pixels.clone(),
            render_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeDocument {
    pub fn new(width: u32, height: u32, children: Vec<DocumentNode>) -> Self {
        Self {
            header: DocumentHeader { width, height },
            flattened: Some(opaque(width, height)),
            slices: Vec::new(),
            root: DocumentNode::root(children),
            composites: HashMap::new(),
            without_text: HashMap::new(),
            pixels: HashMap::new(),
            render_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_composite(mut self, id: &str, image: RgbaImage) -> Self {
        self.composites.insert(id.to_string(), image);
        self
    }

    pub fn with_without_text(mut self, id: &str, image: RgbaImage) -> Self {
        self.without_text.insert(id.to_string(), image);
        self
    }

    pub fn with_pixels(mut self, id: &str, image: RgbaImage) -> Self {
        self.pixels.insert(id.to_string(), image);
        self
    }

    pub fn with_slice(mut self, slice: SliceInfo) -> Self {
        self.slices.push(slice);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.render_calls.lock().expect("calls lock").clone()
    }

    fn lookup(
        &self,
        images: &HashMap<String, RgbaImage>,
        node: &DocumentNode,
        what: &str,
    ) -> Result<RgbaImage, ApplicationError> {
        self.render_calls
            .lock()
            .expect("calls lock")
            .push(format!("{what}:{}", node.id));
        images
            .get(&node.id)
            .cloned()
            .ok_or_else(|| ApplicationError::Render(format!("no {what} for {}", node.id)))
    }
}

impl Document for FakeDocument {
    fn header(&self) -> DocumentHeader {
        self.header
    }

    fn flattened_image(&self) -> Result<RgbaImage, ApplicationError> {
        self.flattened
            .clone()
            .ok_or_else(|| ApplicationError::Render("no flattened image".to_string()))
    }

    fn slices(&self) -> Vec<SliceInfo> {
        self.slices.clone()
    }

    fn tree(&self) -> &DocumentNode {
        &self.root
    }

    fn render(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError> {
        self.lookup(&self.composites, node, "composite")
    }

    fn render_without_text(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError> {
        self.lookup(&self.without_text, node, "without_text")
    }

    fn render_pixels(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError> {
        self.lookup(&self.pixels, node, "pixels")
    }
}

/// Hands out clones of one scripted document. `gate`, when set, makes `open`
/// block until a message arrives.
pub struct FakeRenderer {
    document: Option<FakeDocument>,
    gate: Option<Mutex<Receiver<()>>>,
    panics: bool,
}

impl FakeRenderer {
    pub fn new(document: FakeDocument) -> Self {
        Self {
            document: Some(document),
            gate: None,
            panics: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            document: None,
            gate: None,
            panics: false,
        }
    }

    pub fn gated(document: FakeDocument, gate: Receiver<()>) -> Self {
        Self {
            document: Some(document),
            gate: Some(Mutex::new(gate)),
            panics: false,
        }
    }

    /// Mimics a decoder bug that panics on malformed input.
    pub fn panicking() -> Self {
        Self {
            document: None,
            gate: None,
            panics: true,
        }
    }
}

impl DocumentRenderer for FakeRenderer {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, ApplicationError> {
        if let Some(gate) = &self.gate {
            let _ = gate.lock().expect("gate lock").recv();
        }
        if self.panics {
            panic!("malformed section in {}", path.display());
        }
        let document = self.document.as_ref().ok_or_else(|| {
            ApplicationError::Decode(format!("cannot decode {}", path.display()))
        })?;
        Ok(Box::new(document.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedAsset {
    pub output_dir: PathBuf,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub scales: Vec<ExportScale>,
}

#[derive(Default)]
pub struct RecordingAssetWriter {
    saved: Mutex<Vec<SavedAsset>>,
    removed: Mutex<Vec<PathBuf>>,
    failing_prefixes: Mutex<Vec<String>>,
    existing: Mutex<Vec<PathBuf>>,
    copied: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl RecordingAssetWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_files_starting_with(&self, prefix: &str) {
        self.failing_prefixes
            .lock()
            .expect("prefix lock")
            .push(prefix.to_string());
    }

    pub fn saved(&self) -> Vec<SavedAsset> {
        self.saved.lock().expect("saved lock").clone()
    }

    pub fn saved_starting_with(&self, prefix: &str) -> Vec<SavedAsset> {
        self.saved()
            .into_iter()
            .filter(|asset| asset.filename.starts_with(prefix))
            .collect()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().expect("removed lock").clone()
    }

    /// Makes `path` available as a copy source.
    pub fn add_existing(&self, path: impl Into<PathBuf>) {
        self.existing.lock().expect("existing lock").push(path.into());
    }

    pub fn copied(&self) -> Vec<(PathBuf, PathBuf)> {
        self.copied.lock().expect("copied lock").clone()
    }
}

impl AssetWriter for RecordingAssetWriter {
    fn save_scaled_variants(
        &self,
        image: &RgbaImage,
        output_dir: &Path,
        base_filename: &str,
        scales: &[ExportScale],
    ) -> Result<String, ApplicationError> {
        let failing = self
            .failing_prefixes
            .lock()
            .expect("prefix lock")
            .iter()
            .any(|prefix| base_filename.starts_with(prefix.as_str()));
        if failing {
            return Err(ApplicationError::Io(format!("disk full: {base_filename}")));
        }
        self.saved.lock().expect("saved lock").push(SavedAsset {
            output_dir: output_dir.to_path_buf(),
            filename: base_filename.to_string(),
            width: image.width(),
            height: image.height(),
            scales: scales.to_vec(),
        });
        Ok(base_filename.to_string())
    }

    fn save_full_preview(
        &self,
        image: &RgbaImage,
        output_dir: &Path,
    ) -> Result<String, ApplicationError> {
        self.save_scaled_variants(image, output_dir, "full_preview.jpg", &[ExportScale::ONE])
    }

    fn remove_dir(&self, dir: &Path) -> Result<(), ApplicationError> {
        self.removed
            .lock()
            .expect("removed lock")
            .push(dir.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), ApplicationError> {
        self.removed
            .lock()
            .expect("removed lock")
            .push(path.to_path_buf());
        Ok(())
    }

    fn copy_file(&self, source: &Path, target: &Path) -> Result<bool, ApplicationError> {
        let exists = self
            .existing
            .lock()
            .expect("existing lock")
            .iter()
            .any(|path| path == source);
        if !exists {
            return Ok(false);
        }
        self.copied
            .lock()
            .expect("copied lock")
            .push((source.to_path_buf(), target.to_path_buf()));
        Ok(true)
    }
}

pub struct FixedClock;

impl Clock for FixedClock {
    fn now_timestamp_string(&self) -> String {
        "2026-10-17T12:00:00+00:00".to_string()
    }
}
