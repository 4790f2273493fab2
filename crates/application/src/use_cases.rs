use std::collections::HashMap;
use std::path::PathBuf;

use psd2img_domain::{ExportScale, LayerId, ProcessingMode, ProjectId};

#[derive(Debug, Clone, Default)]
pub struct BootstrapStoreCommand;

#[derive(Debug, Clone)]
pub struct CreateProjectCommand {
    pub name: String,
    pub psd_path: String,
    /// Defaults to `<exports root>/<project id>`.
    pub export_path: Option<PathBuf>,
    pub processing_mode: ProcessingMode,
    pub export_scales: Vec<ExportScale>,
}

#[derive(Debug, Clone, Copy)]
pub struct ShowProjectCommand {
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, Copy)]
pub struct ListLayersCommand {
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, Copy)]
pub struct StartProcessingCommand {
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, Copy)]
pub struct StopProcessingCommand {
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, Copy)]
pub struct WaitProcessingCommand {
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteProjectCommand {
    pub project_id: ProjectId,
}

/// Copies already processed layer images into the project's export
/// directory. Empty `scales` means `1x` only.
#[derive(Debug, Clone)]
pub struct ExportLayersCommand {
    pub project_id: ProjectId,
    pub layer_ids: Vec<LayerId>,
    pub renames: HashMap<LayerId, String>,
    pub scales: Vec<ExportScale>,
    pub clear_directory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub export_dir: PathBuf,
    pub layers_exported: usize,
    pub files_copied: usize,
}
