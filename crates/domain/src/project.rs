use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(i64);

impl ProjectId {
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::InvalidProjectId(value));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Display for ProjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a project export: `pending -> processing -> ready | error`.
/// A stopped job resets the project to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectStatus {
    #[default]
    Pending,
    Processing,
    Ready,
    Error,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl Display for ProjectStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Normal` clips every raster to the canvas. `Aggressive` additionally trims
/// each raster to its tight opaque-pixel bounding box and drops fully
/// transparent nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    #[default]
    Normal,
    Aggressive,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Aggressive => "aggressive",
        }
    }

    /// Unknown or empty values fall back to `Normal`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "aggressive" => Self::Aggressive,
            _ => Self::Normal,
        }
    }

    pub fn trims_transparency(self) -> bool {
        matches!(self, Self::Aggressive)
    }
}

impl Display for ProcessingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer export scale factor, written as `"1x"`, `"2x"`, `"4x"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExportScale(u32);

impl ExportScale {
    pub const ONE: ExportScale = ExportScale(1);

    /// Largest accepted factor. Upscaled variants are allocated in memory
    /// before encoding, so the factor is bounded at parse time.
    pub const MAX_FACTOR: u32 = 16;

    pub fn new(factor: u32) -> Result<Self, DomainError> {
        if factor == 0 || factor > Self::MAX_FACTOR {
            return Err(DomainError::InvalidScale(format!("{factor}x")));
        }
        Ok(Self(factor))
    }

    pub fn factor(self) -> u32 {
        self.0
    }

    pub fn is_base(self) -> bool {
        self.0 == 1
    }

    pub fn parse_list(value: &str) -> Result<Vec<Self>, DomainError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for ExportScale {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits = value
            .trim()
            .strip_suffix(['x', 'X'])
            .ok_or_else(|| DomainError::InvalidScale(value.to_string()))?;
        let factor = digits
            .parse::<u32>()
            .map_err(|_| DomainError::InvalidScale(value.to_string()))?;
        Self::new(factor).map_err(|_| DomainError::InvalidScale(value.to_string()))
    }
}

impl TryFrom<String> for ExportScale {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExportScale> for String {
    fn from(value: ExportScale) -> Self {
        value.to_string()
    }
}

impl Display for ExportScale {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub psd_path: String,
    pub export_path: String,
    pub status: ProjectStatus,
    pub width: u32,
    pub height: u32,
    pub processing_mode: ProcessingMode,
    pub export_scales: Vec<ExportScale>,
    pub processing_started_at: Option<String>,
    pub processing_finished_at: Option<String>,
}

impl Project {
    /// Scales to export, defaulting to `1x` when none were chosen.
    pub fn effective_scales(&self) -> Vec<ExportScale> {
        if self.export_scales.is_empty() {
            return vec![ExportScale::ONE];
        }
        self.export_scales.clone()
    }
}
