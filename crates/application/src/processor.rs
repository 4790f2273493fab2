use std::path::{Path, PathBuf};

use image::RgbaImage;
use log::{debug, error, info, warn};
use psd2img_domain::{
    raster, slice_filename, LayerKind, Project, ProjectId, ProjectStatus,
};
use serde_json::json;

use crate::exporter::{output_dir, ExportSettings, LayerExporter};
use crate::{
    ApplicationError, AssetWriter, CancellationToken, Clock, Document, DocumentRenderer,
    NewLayer, ProjectStore,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub preview_path: Option<String>,
    pub slices_exported: usize,
    pub layers_exported: usize,
}

impl ProcessReport {
    pub fn total_exported(&self) -> usize {
        self.slices_exported + self.layers_exported
    }
}

/// Body of one export job: loads the project, decodes its document and
/// drives preview, slice and tree export, keeping the project status current.
pub struct ProjectProcessor<'a> {
    store: &'a dyn ProjectStore,
    renderer: &'a dyn DocumentRenderer,
    assets: &'a dyn AssetWriter,
    clock: &'a dyn Clock,
    public_root: &'a Path,
}

impl<'a> ProjectProcessor<'a> {
    pub fn new(
        store: &'a dyn ProjectStore,
        renderer: &'a dyn DocumentRenderer,
        assets: &'a dyn AssetWriter,
        clock: &'a dyn Clock,
        public_root: &'a Path,
    ) -> Self {
        Self {
            store,
            renderer,
            assets,
            clock,
            public_root,
        }
    }

    /// Ends with the project `ready` or `error`, except on cancellation,
    /// which leaves the status to whoever cancelled.
    pub fn process(
        &self,
        project_id: ProjectId,
        token: &CancellationToken,
    ) -> Result<ProcessReport, ApplicationError> {
        token.check()?;
        let mut project = self
            .store
            .find_project(project_id)?
            .ok_or_else(|| ApplicationError::NotFound(format!("project {project_id}")))?;

        project.status = ProjectStatus::Processing;
        project.processing_started_at = Some(self.clock.now_timestamp_string());
        project.processing_finished_at = None;
        self.save_project(&project);
        info!("processing project {project_id} from {}", project.psd_path);

        match self.export_project(&mut project, token) {
            Ok(report) => {
                project.status = ProjectStatus::Ready;
                project.processing_finished_at = Some(self.clock.now_timestamp_string());
                self.save_project(&project);
                info!(
                    "project {project_id} ready: {} items exported",
                    report.total_exported()
                );
                Ok(report)
            }
            Err(ApplicationError::Cancelled) => Err(ApplicationError::Cancelled),
            Err(error) => {
                error!("project {project_id} failed: {error}");
                project.status = ProjectStatus::Error;
                project.processing_finished_at = Some(self.clock.now_timestamp_string());
                self.save_project(&project);
                Err(error)
            }
        }
    }

    fn export_project(
        &self,
        project: &mut Project,
        token: &CancellationToken,
    ) -> Result<ProcessReport, ApplicationError> {
        token.check()?;
        let document = self.renderer.open(Path::new(&project.psd_path))?;
        let header = document.header();
        project.width = header.width;
        project.height = header.height;
        self.save_project(project);
        debug!(
            "project {} canvas is {}x{}",
            project.id, header.width, header.height
        );

        let (absolute_dir, relative_dir) = output_dir(self.public_root, project.id);
        let settings = ExportSettings {
            project_id: project.id,
            canvas_width: header.width,
            canvas_height: header.height,
            mode: project.processing_mode,
            scales: project.effective_scales(),
            output_dir: absolute_dir,
            relative_dir,
        };

        let mut report = ProcessReport::default();
        let flattened = document.flattened_image();
        if let Err(error) = &flattened {
            warn!("no flattened image for project {}: {error}", project.id);
        }

        token.check()?;
        if let Ok(image) = &flattened {
            report.preview_path = self.export_preview(image, &settings);
        }

        token.check()?;
        if let Ok(image) = &flattened {
            report.slices_exported =
                self.export_slices(document.as_ref(), image, &settings, token)?;
        }

        token.check()?;
        report.layers_exported =
            LayerExporter::new(&settings, document.as_ref(), self.store, self.assets, token)
                .export_tree()?;
        Ok(report)
    }

    fn export_preview(&self, image: &RgbaImage, settings: &ExportSettings) -> Option<String> {
        match self.assets.save_full_preview(image, &settings.output_dir) {
            Ok(file_name) => Some(settings.stored_path(&file_name)),
            Err(error) => {
                warn!(
                    "failed to write full preview for project {}: {error}",
                    settings.project_id
                );
                None
            }
        }
    }

    fn export_slices(
        &self,
        document: &dyn Document,
        flattened: &RgbaImage,
        settings: &ExportSettings,
        token: &CancellationToken,
    ) -> Result<usize, ApplicationError> {
        let mut exported = 0;
        for slice in document.slices() {
            token.check()?;
            let Some(image) = raster::crop_rect(flattened, &slice.bounds) else {
                debug!("slice {} has no visible area", slice.id);
                continue;
            };

            let file_name = slice_filename(settings.project_id, slice.id);
            let canonical = match self.assets.save_scaled_variants(
                &image,
                &settings.output_dir,
                &file_name,
                &settings.scales,
            ) {
                Ok(canonical) => canonical,
                Err(error) => {
                    error!("failed to save slice {}: {error}", slice.id);
                    continue;
                }
            };

            let name = if slice.name.trim().is_empty() {
                format!("Slice {}", slice.id)
            } else {
                slice.name.clone()
            };
            let scales: Vec<String> = settings.scales.iter().map(ToString::to_string).collect();
            let record = NewLayer {
                project_id: settings.project_id,
                resource_id: format!("slice_{}", slice.id),
                name,
                kind: LayerKind::Slice,
                bounds: slice.bounds,
                content: None,
                image_path: settings.stored_path(&canonical),
                metadata_json: json!({ "scales": scales }).to_string(),
                parent_id: None,
                hidden: false,
            };
            match self.store.create_layer(&record) {
                Ok(_) => exported += 1,
                Err(error) => error!("failed to store slice {}: {error}", slice.id),
            }
        }
        Ok(exported)
    }

    fn save_project(&self, project: &Project) {
        if let Err(error) = self.store.update_project(project) {
            warn!("failed to update project {}: {error}", project.id);
        }
    }
}

/// Directory holding every asset of `project_id` below `public_root`.
pub fn project_output_dir(public_root: &Path, project_id: ProjectId) -> PathBuf {
    output_dir(public_root, project_id).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        opaque, project_fixture, FakeDocument, FakeRenderer, FixedClock, InMemoryStore,
        RecordingAssetWriter,
    };
    use crate::{DocumentNode, SliceInfo};
    use psd2img_domain::{ProcessingMode, Rect};

    struct Harness {
        store: InMemoryStore,
        renderer: FakeRenderer,
        assets: RecordingAssetWriter,
        project_id: ProjectId,
    }

    impl Harness {
        fn new(renderer: FakeRenderer) -> Self {
            let store = InMemoryStore::new();
            let project_id = store
                .create_project(&project_fixture(ProcessingMode::Normal))
                .expect("project");
            Self {
                store,
                renderer,
                assets: RecordingAssetWriter::new(),
                project_id,
            }
        }

        fn process(&self, token: &CancellationToken) -> Result<ProcessReport, ApplicationError> {
            ProjectProcessor::new(
                &self.store,
                &self.renderer,
                &self.assets,
                &FixedClock,
                Path::new("/srv/public"),
            )
            .process(self.project_id, token)
        }
    }

    fn sample_document() -> FakeDocument {
        FakeDocument::new(
            120,
            80,
            vec![DocumentNode::layer("bg", "Background", Rect::new(0, 0, 120, 80))],
        )
        .with_pixels("bg", opaque(120, 80))
        .with_slice(SliceInfo {
            id: 4,
            name: String::new(),
            bounds: Rect::new(100, 60, 40, 40),
        })
        .with_slice(SliceInfo {
            id: 5,
            name: "Offscreen".to_string(),
            bounds: Rect::new(500, 500, 10, 10),
        })
    }

    #[test]
    fn successful_run_marks_project_ready() {
        let harness = Harness::new(FakeRenderer::new(sample_document()));

        let report = harness.process(&CancellationToken::new()).expect("process");

        assert_eq!(report.slices_exported, 1);
        assert_eq!(report.layers_exported, 1);
        assert_eq!(
            report.preview_path.as_deref(),
            Some(format!("processed/{}/full_preview.jpg", harness.project_id).as_str())
        );

        let project = harness.store.project(harness.project_id);
        assert_eq!(project.status, ProjectStatus::Ready);
        assert_eq!((project.width, project.height), (120, 80));
        assert!(project.processing_started_at.is_some());
        assert!(project.processing_finished_at.is_some());
    }

    #[test]
    fn slices_are_cropped_named_and_parentless() {
        let harness = Harness::new(FakeRenderer::new(sample_document()));

        harness.process(&CancellationToken::new()).expect("process");

        let slice = harness.store.layer_named("Slice 4").expect("slice record");
        assert_eq!(slice.kind, LayerKind::Slice);
        assert_eq!(slice.parent_id, None);
        assert_eq!(slice.resource_id, "slice_4");
        assert_eq!(slice.bounds, Rect::new(100, 60, 40, 40));
        let expected_file = slice_filename(harness.project_id, 4);
        assert_eq!(
            slice.image_path,
            format!("processed/{}/{expected_file}", harness.project_id)
        );
        let saved = harness.assets.saved_starting_with("slice_");
        assert_eq!(saved.len(), 1);
        assert_eq!((saved[0].width, saved[0].height), (20, 20));
        assert!(harness.store.layer_named("Offscreen").is_none());
    }

    #[test]
    fn undecodable_document_marks_project_failed() {
        let harness = Harness::new(FakeRenderer::failing());

        let result = harness.process(&CancellationToken::new());

        assert!(matches!(result, Err(ApplicationError::Decode(_))));
        let project = harness.store.project(harness.project_id);
        assert_eq!(project.status, ProjectStatus::Error);
        assert!(project.processing_finished_at.is_some());
    }

    #[test]
    fn missing_project_is_fatal() {
        let harness = Harness::new(FakeRenderer::new(sample_document()));
        let unknown = ProjectId::new(99).expect("id");

        let result = ProjectProcessor::new(
            &harness.store,
            &harness.renderer,
            &harness.assets,
            &FixedClock,
            Path::new("/srv/public"),
        )
        .process(unknown, &CancellationToken::new());

        assert!(matches!(result, Err(ApplicationError::NotFound(_))));
    }

    #[test]
    fn cancellation_leaves_status_for_the_caller() {
        let harness = Harness::new(FakeRenderer::new(sample_document()));
        let token = CancellationToken::new();
        token.cancel();

        let result = harness.process(&token);

        assert!(matches!(result, Err(ApplicationError::Cancelled)));
        assert_eq!(
            harness.store.project(harness.project_id).status,
            ProjectStatus::Pending
        );
        assert!(harness.store.layers().is_empty());
    }

    #[test]
    fn preview_failure_does_not_fail_job() {
        let harness = Harness::new(FakeRenderer::new(sample_document()));
        harness.assets.fail_files_starting_with("full_preview");

        let report = harness.process(&CancellationToken::new()).expect("process");

        assert_eq!(report.preview_path, None);
        assert_eq!(
            harness.store.project(harness.project_id).status,
            ProjectStatus::Ready
        );
    }

    #[test]
    fn output_dir_lives_under_processed() {
        let id = ProjectId::new(12).expect("id");
        assert_eq!(
            project_output_dir(Path::new("/srv/public"), id),
            PathBuf::from("/srv/public/processed/12")
        );
    }
}
