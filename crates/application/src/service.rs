use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};
use psd2img_domain::{
    is_supported_document, sanitize_filename, scaled_filename, ExportScale, LayerRecord, Project,
    ProjectId, ProjectStatus, DOCUMENT_EXTENSIONS,
};

use crate::processor::{project_output_dir, ProjectProcessor};
use crate::{
    ApplicationError, AssetWriter, BootstrapStoreCommand, Clock, CreateProjectCommand,
    DeleteProjectCommand, DocumentRenderer, ExportLayersCommand, ExportSummary, ListLayersCommand,
    NewProject, ProjectStore, ShowProjectCommand, StartProcessingCommand, StopProcessingCommand,
    TaskRunner, WaitProcessingCommand,
};

/// Entry point for drivers. Collaborators are shared with the background
/// export jobs, hence `Arc` rather than `Box`.
pub struct ExportService {
    store: Arc<dyn ProjectStore>,
    renderer: Arc<dyn DocumentRenderer>,
    assets: Arc<dyn AssetWriter>,
    clock: Arc<dyn Clock>,
    public_root: PathBuf,
    exports_root: PathBuf,
    tasks: TaskRunner,
}

impl ExportService {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        renderer: Arc<dyn DocumentRenderer>,
        assets: Arc<dyn AssetWriter>,
        clock: Arc<dyn Clock>,
        public_root: PathBuf,
        exports_root: PathBuf,
    ) -> Self {
        Self {
            store,
            renderer,
            assets,
            clock,
            public_root,
            exports_root,
            tasks: TaskRunner::new(),
        }
    }

    pub fn bootstrap_store(
        &self,
        _command: BootstrapStoreCommand,
    ) -> Result<(), ApplicationError> {
        self.store.initialize()
    }

    pub fn create_project(
        &self,
        command: CreateProjectCommand,
    ) -> Result<Project, ApplicationError> {
        if command.psd_path.trim().is_empty() {
            return Err(ApplicationError::InvalidInput(
                "document path must not be empty".to_string(),
            ));
        }
        if !is_supported_document(&command.psd_path) {
            return Err(ApplicationError::InvalidInput(format!(
                "{} is not a layered document, expected one of: {}",
                command.psd_path,
                DOCUMENT_EXTENSIONS.join(", ")
            )));
        }
        let name = if command.name.trim().is_empty() {
            default_project_name(&command.psd_path)
        } else {
            command.name
        };
        let export_path = command
            .export_path
            .map(|path| path.to_string_lossy().to_string())
            .unwrap_or_default();

        let project_id = self.store.create_project(&NewProject {
            name,
            psd_path: command.psd_path,
            export_path,
            processing_mode: command.processing_mode,
            export_scales: command.export_scales,
        })?;
        let mut project = self.load_project(project_id)?;
        if project.export_path.is_empty() {
            // the id is only known after insert
            project.export_path = self
                .exports_root
                .join(project_id.to_string())
                .to_string_lossy()
                .to_string();
            self.store.update_project(&project)?;
        }
        info!("created project {project_id}");
        Ok(project)
    }

    pub fn show_project(&self, command: ShowProjectCommand) -> Result<Project, ApplicationError> {
        self.load_project(command.project_id)
    }

    pub fn list_layers(
        &self,
        command: ListLayersCommand,
    ) -> Result<Vec<LayerRecord>, ApplicationError> {
        self.load_project(command.project_id)?;
        self.store.list_layers(command.project_id)
    }

    /// Marks a pending project as processing and hands its export to a
    /// background job. A job that panics leaves the project in `error`.
    pub fn start_processing(
        &self,
        command: StartProcessingCommand,
    ) -> Result<(), ApplicationError> {
        let project_id = command.project_id;
        let mut project = self.load_project(project_id)?;
        if project.status != ProjectStatus::Pending {
            return Err(ApplicationError::InvalidInput(format!(
                "project {project_id} is {}, only pending projects can be processed",
                project.status
            )));
        }
        project.status = ProjectStatus::Processing;
        self.store.update_project(&project)?;

        let store = Arc::clone(&self.store);
        let renderer = Arc::clone(&self.renderer);
        let assets = Arc::clone(&self.assets);
        let clock = Arc::clone(&self.clock);
        let public_root = self.public_root.clone();
        self.tasks.start(project_id, move |token| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                ProjectProcessor::new(
                    store.as_ref(),
                    renderer.as_ref(),
                    assets.as_ref(),
                    clock.as_ref(),
                    &public_root,
                )
                .process(project_id, &token)
                .map(|_| ())
            }));
            outcome.unwrap_or_else(|payload| {
                let reason = panic_message(payload.as_ref());
                error!("export job for project {project_id} panicked: {reason}");
                mark_failed(store.as_ref(), clock.as_ref(), project_id);
                Err(ApplicationError::Render(format!("export job panicked: {reason}")))
            })
        })
    }

    /// Cancels the running export, removes everything it wrote and resets
    /// the project to pending. A project stuck in `processing` without a live
    /// job is reset the same way.
    pub fn stop_processing(
        &self,
        command: StopProcessingCommand,
    ) -> Result<Project, ApplicationError> {
        let project_id = command.project_id;
        let project = self.load_project(project_id)?;
        let stopped = self.tasks.stop(project_id)?;
        if !stopped && project.status != ProjectStatus::Processing {
            return Err(ApplicationError::NotFound(format!(
                "no export running for project {project_id}"
            )));
        }

        self.remove_outputs(project_id)?;
        let mut project = self.load_project(project_id)?;
        project.status = ProjectStatus::Pending;
        project.processing_finished_at = Some(self.clock.now_timestamp_string());
        self.store.update_project(&project)?;
        info!("stopped processing of project {project_id}");
        Ok(project)
    }

    /// Blocks until the running export (if any) finishes on its own and
    /// returns the project as it was left.
    pub fn wait_for_processing(
        &self,
        command: WaitProcessingCommand,
    ) -> Result<Project, ApplicationError> {
        self.tasks.wait(command.project_id)?;
        self.load_project(command.project_id)
    }

    pub fn is_processing(&self, project_id: ProjectId) -> bool {
        self.tasks.is_running(project_id)
    }

    /// Copies the selected layers' images, every requested scale, into the
    /// project's export directory. Files are named after the layer (or its
    /// rename); clashing names get a `_<n>` suffix. Layers without an image
    /// and scale variants that were never written are skipped.
    pub fn export_layers(
        &self,
        command: ExportLayersCommand,
    ) -> Result<ExportSummary, ApplicationError> {
        let project = self.load_project(command.project_id)?;
        if project.export_path.trim().is_empty() {
            return Err(ApplicationError::InvalidInput(format!(
                "project {} has no export directory",
                project.id
            )));
        }
        if command.layer_ids.is_empty() {
            return Err(ApplicationError::InvalidInput(
                "at least one layer id is required".to_string(),
            ));
        }

        let wanted: HashSet<_> = command.layer_ids.iter().copied().collect();
        let layers: Vec<LayerRecord> = self
            .store
            .list_layers(project.id)?
            .into_iter()
            .filter(|layer| wanted.contains(&layer.id) && !layer.image_path.is_empty())
            .collect();
        if layers.is_empty() {
            return Err(ApplicationError::InvalidInput(format!(
                "none of the requested layers has an exported image in project {}",
                project.id
            )));
        }

        let export_dir = PathBuf::from(&project.export_path);
        if command.clear_directory {
            self.assets.remove_dir(&export_dir)?;
        }
        let scales = if command.scales.is_empty() {
            vec![ExportScale::ONE]
        } else {
            command.scales
        };

        let mut taken = HashSet::new();
        let mut summary = ExportSummary {
            export_dir: export_dir.clone(),
            layers_exported: 0,
            files_copied: 0,
        };
        for layer in &layers {
            let source = self.public_root.join(&layer.image_path);
            let extension = source
                .extension()
                .map(|ext| ext.to_string_lossy().to_string())
                .unwrap_or_else(|| "png".to_string());
            let display_name = command
                .renames
                .get(&layer.id)
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .unwrap_or(layer.name.as_str());
            let target_name = reserve_name(
                &mut taken,
                &sanitize_filename(display_name),
                &extension,
                &scales,
            );

            let mut copied = 0;
            for &scale in &scales {
                let Some(source_name) = source.file_name() else {
                    continue;
                };
                let source_name = scaled_filename(&source_name.to_string_lossy(), scale);
                let scaled_source = source.with_file_name(source_name);
                let target = export_dir.join(scaled_filename(&target_name, scale));
                if self.assets.copy_file(&scaled_source, &target)? {
                    copied += 1;
                } else {
                    warn!("skipping missing {}", scaled_source.display());
                }
            }
            if copied > 0 {
                summary.layers_exported += 1;
                summary.files_copied += copied;
            }
        }
        info!(
            "exported {} layers ({} files) of project {} to {}",
            summary.layers_exported,
            summary.files_copied,
            project.id,
            export_dir.display()
        );
        Ok(summary)
    }

    /// Removes the project with its layer records, its processed assets, the
    /// stored source document and its export directory.
    pub fn delete_project(&self, command: DeleteProjectCommand) -> Result<(), ApplicationError> {
        let project_id = command.project_id;
        let project = self.load_project(project_id)?;
        if self.tasks.stop(project_id)? {
            info!("cancelled running export before deleting project {project_id}");
        }
        self.remove_outputs(project_id)?;
        if !project.psd_path.trim().is_empty() {
            let source = Path::new(&project.psd_path);
            if let Err(error) = self.assets.remove_file(source) {
                warn!("failed to remove {}: {error}", source.display());
            }
        }
        if !project.export_path.trim().is_empty() {
            let export_dir = Path::new(&project.export_path);
            if let Err(error) = self.assets.remove_dir(export_dir) {
                warn!("failed to remove {}: {error}", export_dir.display());
            }
        }
        self.store.delete_project(project_id)?;
        info!("deleted project {project_id}");
        Ok(())
    }

    fn remove_outputs(&self, project_id: ProjectId) -> Result<(), ApplicationError> {
        let dir = project_output_dir(&self.public_root, project_id);
        if let Err(error) = self.assets.remove_dir(&dir) {
            warn!("failed to remove {}: {error}", dir.display());
        }
        let removed = self.store.delete_layers(project_id)?;
        info!("removed {removed} layer records of project {project_id}");
        Ok(())
    }

    fn load_project(&self, project_id: ProjectId) -> Result<Project, ApplicationError> {
        self.store.find_project(project_id)?.ok_or_else(|| {
            ApplicationError::NotFound(format!("project not found for id={project_id}"))
        })
    }
}

fn default_project_name(psd_path: &str) -> String {
    Path::new(psd_path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| psd_path.to_string())
}

/// Picks `stem.ext`, or the first free `stem_<n>.ext`, such that no scale
/// variant of it is already taken, and reserves every variant.
fn reserve_name(
    taken: &mut HashSet<String>,
    stem: &str,
    extension: &str,
    scales: &[ExportScale],
) -> String {
    let mut candidate = format!("{stem}.{extension}");
    let mut counter = 1;
    while scales
        .iter()
        .any(|&scale| taken.contains(&scaled_filename(&candidate, scale)))
    {
        candidate = format!("{stem}_{counter}.{extension}");
        counter += 1;
    }
    for &scale in scales {
        taken.insert(scaled_filename(&candidate, scale));
    }
    candidate
}

fn mark_failed(store: &dyn ProjectStore, clock: &dyn Clock, project_id: ProjectId) {
    let result = store.find_project(project_id).and_then(|found| {
        let mut project = found.ok_or_else(|| {
            ApplicationError::NotFound(format!("project not found for id={project_id}"))
        })?;
        project.status = ProjectStatus::Error;
        project.processing_finished_at = Some(clock.now_timestamp_string());
        store.update_project(&project)
    });
    if let Err(error) = result {
        warn!("could not mark project {project_id} as failed: {error}");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
