//! PSD decoder backed by the `psd` crate.
//!
//! The crate exposes flat layer and group lists with parent ids; they are
//! rebuilt into an owned [`DocumentNode`] tree here. Layer rasters come from
//! the crate's canvas-sized RGBA buffers cropped to the layer rectangle, and
//! groups are composited with `flatten_layers_rgba` over their descendant
//! layers. The crate reports neither slices nor text, so neither is exposed.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use image::RgbaImage;
use log::debug;
use ::psd::{Psd, PsdLayer};
use psd2img_application::{
    ApplicationError, Document, DocumentHeader, DocumentNode, DocumentRenderer, SliceInfo,
};
use psd2img_domain::{raster, Rect};

#[derive(Debug, Default)]
pub struct PsdCrateRenderer;

impl DocumentRenderer for PsdCrateRenderer {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, ApplicationError> {
        let bytes = fs::read(path)
            .map_err(|error| ApplicationError::Io(format!("{}: {error}", path.display())))?;
        let psd = Psd::from_bytes(&bytes)
            .map_err(|error| ApplicationError::Decode(format!("{}: {error}", path.display())))?;
        Ok(Box::new(PsdDocument::new(psd)))
    }
}

struct PsdDocument {
    psd: Psd,
    root: DocumentNode,
    /// Layer node id to index into `psd.layers()`.
    layer_index: HashMap<String, usize>,
    /// Group node id to the indices of every layer below it.
    group_members: HashMap<String, HashSet<usize>>,
}

impl PsdDocument {
    fn new(psd: Psd) -> Self {
        let group_parents: HashMap<u32, Option<u32>> = psd
            .groups()
            .iter()
            .map(|group| (group.id(), group.parent_id()))
            .collect();

        let mut layer_index = HashMap::new();
        let mut group_members: HashMap<String, HashSet<usize>> = HashMap::new();
        for (index, layer) in psd.layers().iter().enumerate() {
            layer_index.insert(layer_node_id(index), index);
            let mut ancestor = layer.parent_id();
            while let Some(group_id) = ancestor {
                group_members
                    .entry(group_node_id(group_id))
                    .or_default()
                    .insert(index);
                ancestor = group_parents.get(&group_id).copied().flatten();
            }
        }

        let canvas = Rect::new(0, 0, i64::from(psd.width()), i64::from(psd.height()));
        let root = DocumentNode::root(children_of(&psd, None, &canvas));
        Self {
            psd,
            root,
            layer_index,
            group_members,
        }
    }

    fn canvas_image(&self, rgba: Vec<u8>) -> Result<RgbaImage, ApplicationError> {
        RgbaImage::from_raw(self.psd.width(), self.psd.height(), rgba).ok_or_else(|| {
            ApplicationError::Render("composite buffer does not match canvas size".to_string())
        })
    }

    fn layer_raster(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError> {
        let index = self
            .layer_index
            .get(&node.id)
            .copied()
            .ok_or_else(|| ApplicationError::Render(format!("{} is not a layer", node.id)))?;
        let layer = &self.psd.layers()[index];
        let canvas = self.canvas_image(layer.rgba())?;
        raster::crop_rect(&canvas, &node.bounds)
            .ok_or_else(|| ApplicationError::Render(format!("layer {:?} is empty", node.name)))
    }

    fn group_composite(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError> {
        let members = self.group_members.get(&node.id).cloned().unwrap_or_default();
        if members.is_empty() {
            return Err(ApplicationError::Render(format!(
                "group {:?} has no layers",
                node.name
            )));
        }
        let rgba = self
            .psd
            .flatten_layers_rgba(&|(index, _layer): (usize, &PsdLayer)| members.contains(&index))
            .map_err(|error| ApplicationError::Render(error.to_string()))?;
        self.canvas_image(rgba)
    }
}

impl Document for PsdDocument {
    fn header(&self) -> DocumentHeader {
        DocumentHeader {
            width: self.psd.width(),
            height: self.psd.height(),
        }
    }

    fn flattened_image(&self) -> Result<RgbaImage, ApplicationError> {
        self.canvas_image(self.psd.rgba())
    }

    fn slices(&self) -> Vec<SliceInfo> {
        Vec::new()
    }

    fn tree(&self) -> &DocumentNode {
        &self.root
    }

    fn render(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError> {
        if node.is_group {
            self.group_composite(node)
        } else {
            self.layer_raster(node)
        }
    }

    fn render_without_text(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError> {
        debug!("no text information for {:?}", node.name);
        Err(ApplicationError::Render(
            "text layers are not available from this decoder".to_string(),
        ))
    }

    fn render_pixels(&self, node: &DocumentNode) -> Result<RgbaImage, ApplicationError> {
        self.layer_raster(node)
    }
}

fn layer_node_id(index: usize) -> String {
    format!("layer-{index}")
}

fn group_node_id(id: u32) -> String {
    format!("group-{id}")
}

/// Groups come first, then layers, each in file order. Group composites are
/// canvas sized, so groups carry empty bounds and are placed at the origin.
fn children_of(psd: &Psd, parent: Option<u32>, canvas: &Rect) -> Vec<DocumentNode> {
    let mut nodes: Vec<DocumentNode> = psd
        .groups()
        .iter()
        .filter(|group| group.parent_id() == parent)
        .map(|group| {
            DocumentNode::group(
                &group_node_id(group.id()),
                group.name(),
                Rect::default(),
                children_of(psd, Some(group.id()), canvas),
            )
        })
        .collect();

    nodes.extend(
        psd.layers()
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.parent_id() == parent)
            .map(|(index, layer)| layer_node(index, layer, canvas)),
    );
    nodes
}

fn layer_node(index: usize, layer: &PsdLayer, canvas: &Rect) -> DocumentNode {
    let placement = Rect::new(
        i64::from(layer.layer_left()),
        i64::from(layer.layer_top()),
        i64::from(layer.width()),
        i64::from(layer.height()),
    );
    // the crate only hands out canvas-sized buffers
    let bounds = placement.intersect(canvas).unwrap_or_default();
    let mut node = DocumentNode::layer(&layer_node_id(index), layer.name(), bounds);
    node.visible = layer.visible();
    node.opacity = layer.opacity();
    node.blend_mode = format!("{:?}", layer.blend_mode()).to_lowercase();
    node
}
