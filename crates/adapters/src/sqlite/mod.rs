mod queries;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use psd2img_application::{ApplicationError, NewLayer, NewProject, ProjectStore};
use psd2img_domain::{
    ExportScale, LayerId, LayerKind, LayerRecord, ProcessingMode, Project, ProjectId, Rect,
};
use rusqlite::Connection;

use crate::migrations::MIGRATIONS;
use queries::{LayerRow, ProjectRow};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a fresh connection per call, so one repository value can be shared
/// by every export job.
#[derive(Debug, Clone)]
pub struct SqliteProjectRepository {
    path: PathBuf,
}

impl SqliteProjectRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open_connection(&self) -> Result<Connection, ApplicationError> {
        let conn = Connection::open(&self.path).map_err(persistence)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(persistence)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(persistence)?;
        Ok(conn)
    }
}

impl ProjectStore for SqliteProjectRepository {
    fn initialize(&self) -> Result<(), ApplicationError> {
        if self.path.as_os_str().is_empty() {
            return Err(ApplicationError::InvalidInput(
                "database path must not be empty".to_string(),
            ));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|error| ApplicationError::Io(error.to_string()))?;
            }
        }

        let conn = self.open_connection()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(persistence)?;
        for migration in MIGRATIONS {
            conn.execute_batch(migration).map_err(persistence)?;
        }
        Ok(())
    }

    fn create_project(&self, project: &NewProject) -> Result<ProjectId, ApplicationError> {
        let conn = self.open_connection()?;
        let scales = encode_scales(&project.export_scales)?;
        let id = queries::insert_project(
            &conn,
            &project.name,
            &project.psd_path,
            &project.export_path,
            &scales,
            project.processing_mode.as_str(),
        )
        .map_err(persistence)?;
        Ok(ProjectId::new(id)?)
    }

    fn find_project(&self, project_id: ProjectId) -> Result<Option<Project>, ApplicationError> {
        let conn = self.open_connection()?;
        queries::find_project(&conn, project_id.get())
            .map_err(persistence)?
            .map(project_from_row)
            .transpose()
    }

    fn update_project(&self, project: &Project) -> Result<(), ApplicationError> {
        let conn = self.open_connection()?;
        let row = ProjectRow {
            id: project.id.get(),
            name: project.name.clone(),
            psd_path: project.psd_path.clone(),
            export_path: project.export_path.clone(),
            status: project.status.as_str().to_string(),
            export_scales: encode_scales(&project.export_scales)?,
            width: i64::from(project.width),
            height: i64::from(project.height),
            processing_mode: project.processing_mode.as_str().to_string(),
            processing_started_at: project.processing_started_at.clone(),
            processing_finished_at: project.processing_finished_at.clone(),
        };
        let updated = queries::update_project(&conn, &row).map_err(persistence)?;
        if updated == 0 {
            return Err(ApplicationError::NotFound(format!(
                "project not found for id={}",
                project.id
            )));
        }
        Ok(())
    }

    fn delete_project(&self, project_id: ProjectId) -> Result<(), ApplicationError> {
        let conn = self.open_connection()?;
        queries::delete_project(&conn, project_id.get()).map_err(persistence)?;
        Ok(())
    }

    fn create_layer(&self, layer: &NewLayer) -> Result<LayerId, ApplicationError> {
        let conn = self.open_connection()?;
        let row = LayerRow {
            id: 0,
            project_id: layer.project_id.get(),
            resource_id: layer.resource_id.clone(),
            name: layer.name.clone(),
            layer_type: layer.kind.as_str().to_string(),
            x: layer.bounds.x,
            y: layer.bounds.y,
            width: layer.bounds.width,
            height: layer.bounds.height,
            content: layer.content.clone(),
            image_path: layer.image_path.clone(),
            metadata: layer.metadata_json.clone(),
            parent_id: layer.parent_id.map(LayerId::get),
            hidden: layer.hidden,
        };
        let id = queries::insert_layer(&conn, &row).map_err(persistence)?;
        Ok(LayerId::new(id)?)
    }

    fn list_layers(&self, project_id: ProjectId) -> Result<Vec<LayerRecord>, ApplicationError> {
        let conn = self.open_connection()?;
        queries::list_layers(&conn, project_id.get())
            .map_err(persistence)?
            .into_iter()
            .map(layer_from_row)
            .collect()
    }

    fn delete_layers(&self, project_id: ProjectId) -> Result<usize, ApplicationError> {
        let conn = self.open_connection()?;
        queries::delete_layers(&conn, project_id.get()).map_err(persistence)
    }
}

fn persistence(error: rusqlite::Error) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn encode_scales(scales: &[ExportScale]) -> Result<String, ApplicationError> {
    serde_json::to_string(scales).map_err(|error| ApplicationError::Persistence(error.to_string()))
}

fn project_from_row(row: ProjectRow) -> Result<Project, ApplicationError> {
    let export_scales: Vec<ExportScale> = serde_json::from_str(&row.export_scales)
        .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
    Ok(Project {
        id: ProjectId::new(row.id)?,
        name: row.name,
        psd_path: row.psd_path,
        export_path: row.export_path,
        status: row.status.parse()?,
        width: dimension(row.width)?,
        height: dimension(row.height)?,
        processing_mode: ProcessingMode::parse_lenient(&row.processing_mode),
        export_scales,
        processing_started_at: row.processing_started_at,
        processing_finished_at: row.processing_finished_at,
    })
}

fn layer_from_row(row: LayerRow) -> Result<LayerRecord, ApplicationError> {
    Ok(LayerRecord {
        id: LayerId::new(row.id)?,
        project_id: ProjectId::new(row.project_id)?,
        resource_id: row.resource_id,
        name: row.name,
        kind: row.layer_type.parse::<LayerKind>()?,
        bounds: Rect::new(row.x, row.y, row.width, row.height),
        content: row.content,
        image_path: row.image_path,
        metadata_json: row.metadata,
        parent_id: row.parent_id.map(LayerId::new).transpose()?,
        hidden: row.hidden,
    })
}

fn dimension(value: i64) -> Result<u32, ApplicationError> {
    u32::try_from(value).map_err(|_| {
        ApplicationError::Persistence(format!("stored dimension out of range: {value}"))
    })
}
