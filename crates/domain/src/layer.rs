use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::{DomainError, ProjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(i64);

impl LayerId {
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::InvalidLayerId(value));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Display for LayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag of a persisted layer record. `Slice` is synthetic: slices come
/// from the document's slice list, never from the layer tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Slice,
    Layer,
    Group,
    Text,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slice => "slice",
            Self::Layer => "layer",
            Self::Group => "group",
            Self::Text => "text",
        }
    }
}

impl FromStr for LayerKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "slice" => Ok(Self::Slice),
            "layer" => Ok(Self::Layer),
            "group" => Ok(Self::Group),
            "text" => Ok(Self::Text),
            other => Err(DomainError::UnknownLayerKind(other.to_string())),
        }
    }
}

impl Display for LayerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placement of a raster on the document canvas. Width and height may be zero
/// for empty nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_edges(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::from_edges(left, top, right, bottom))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRecord {
    pub id: LayerId,
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
