mod args;
mod config;
mod logging;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use args::{Cli, Commands};
use clap::Parser;
use config::AppConfig;
use log::info;
use psd2img_adapters::{
    present_export_summary, present_layer_row, present_project, FsAssetWriter,
    SqliteProjectRepository, SystemClock,
};
use psd2img_application::{
    ApplicationError, BootstrapStoreCommand, CreateProjectCommand, DeleteProjectCommand,
    DocumentRenderer, ExportLayersCommand, ExportService, ListLayersCommand, ShowProjectCommand,
    StartProcessingCommand, StopProcessingCommand, WaitProcessingCommand,
};
use psd2img_domain::{
    is_supported_document, sanitize_filename, short_digest, ExportScale, LayerId,
    ProcessingMode, ProjectId, ProjectStatus, DOCUMENT_EXTENSIONS,
};

fn main() -> ExitCode {
    logging::init_logging();
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    if let Err(error) = config.ensure_directories() {
        eprintln!("failed to prepare directories: {error}");
        return ExitCode::from(1);
    }

    let service = build_export_service(&config);
    if let Err(error) = service.bootstrap_store(BootstrapStoreCommand) {
        eprintln!("failed to bootstrap psd2img: {error}");
        return ExitCode::from(1);
    }

    match run_command(cli.command, &service, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CommandError::Usage(msg)) => {
            eprintln!("{msg}");
            ExitCode::from(2)
        }
        Err(CommandError::Runtime(msg)) => {
            eprintln!("{msg}");
            ExitCode::from(1)
        }
    }
}

fn build_export_service(config: &AppConfig) -> ExportService {
    ExportService::new(
        Arc::new(SqliteProjectRepository::new(config.database_path.clone())),
        document_renderer(),
        Arc::new(FsAssetWriter),
        Arc::new(SystemClock),
        config.public_path.clone(),
        config.exports_path.clone(),
    )
}

#[cfg(feature = "psd")]
fn document_renderer() -> Arc<dyn DocumentRenderer> {
    Arc::new(psd2img_adapters::PsdCrateRenderer)
}

#[cfg(not(feature = "psd"))]
fn document_renderer() -> Arc<dyn DocumentRenderer> {
    Arc::new(psd2img_adapters::UnavailableRenderer)
}

#[derive(Debug, Clone)]
enum CommandError {
    Usage(String),
    Runtime(String),
}

impl From<ApplicationError> for CommandError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::InvalidInput(_) | ApplicationError::Domain(_) => {
                Self::Usage(error.to_string())
            }
            other => Self::Runtime(other.to_string()),
        }
    }
}

fn run_command(
    command: Commands,
    service: &ExportService,
    config: &AppConfig,
) -> Result<(), CommandError> {
    match command {
        Commands::Create {
            psd,
            name,
            mode,
            scales,
        } => {
            let export_scales = ExportScale::parse_list(&scales)
                .map_err(|error| CommandError::Usage(format!("invalid scales: {error}")))?;
            let stored = copy_upload(Path::new(&psd), &config.uploads_path)?;
            let project = service.create_project(CreateProjectCommand {
                name: name.unwrap_or_default(),
                psd_path: stored.to_string_lossy().to_string(),
                export_path: None,
                processing_mode: ProcessingMode::parse_lenient(&mode),
                export_scales,
            })?;
            println!("{}", present_project(&project));
            Ok(())
        }
        Commands::Process { project_id } => {
            let project_id = parse_project_id(project_id)?;
            service.start_processing(StartProcessingCommand { project_id })?;
            let project = service.wait_for_processing(WaitProcessingCommand { project_id })?;
            println!("{}", present_project(&project));
            if project.status == ProjectStatus::Error {
                return Err(CommandError::Runtime(format!(
                    "processing of project {project_id} failed"
                )));
            }
            Ok(())
        }
        Commands::Show { project_id } => {
            let project_id = parse_project_id(project_id)?;
            let project = service.show_project(ShowProjectCommand { project_id })?;
            println!("{}", present_project(&project));
            Ok(())
        }
        Commands::Layers { project_id } => {
            let project_id = parse_project_id(project_id)?;
            let layers = service.list_layers(ListLayersCommand { project_id })?;
            if layers.is_empty() {
                println!("no layers exported for project {project_id}");
                return Ok(());
            }
            for layer in layers {
                println!("{}", present_layer_row(&layer));
            }
            Ok(())
        }
        Commands::Export {
            project_id,
            layers,
            scales,
            clear,
            renames,
        } => {
            let project_id = parse_project_id(project_id)?;
            let layer_ids = layers
                .into_iter()
                .map(parse_layer_id)
                .collect::<Result<Vec<_>, _>>()?;
            let scales = match scales {
                Some(list) => ExportScale::parse_list(&list)
                    .map_err(|error| CommandError::Usage(format!("invalid scales: {error}")))?,
                None => Vec::new(),
            };
            let summary = service.export_layers(ExportLayersCommand {
                project_id,
                layer_ids,
                renames: parse_renames(&renames)?,
                scales,
                clear_directory: clear,
            })?;
            println!("{}", present_export_summary(&summary));
            Ok(())
        }
        Commands::Reset { project_id } => {
            let project_id = parse_project_id(project_id)?;
            let project = service.stop_processing(StopProcessingCommand { project_id })?;
            println!("{}", present_project(&project));
            Ok(())
        }
        Commands::Delete { project_id } => {
            let project_id = parse_project_id(project_id)?;
            service.delete_project(DeleteProjectCommand { project_id })?;
            println!("deleted project {project_id}");
            Ok(())
        }
    }
}

fn parse_project_id(value: i64) -> Result<ProjectId, CommandError> {
    ProjectId::new(value)
        .map_err(|error| CommandError::Usage(format!("invalid project id: {error}")))
}

fn parse_layer_id(value: i64) -> Result<LayerId, CommandError> {
    LayerId::new(value).map_err(|error| CommandError::Usage(format!("invalid layer id: {error}")))
}

/// Parses repeated `<layer id>=<name>` arguments.
fn parse_renames(values: &[String]) -> Result<HashMap<LayerId, String>, CommandError> {
    values
        .iter()
        .map(|value| {
            let (id, name) = value.split_once('=').ok_or_else(|| {
                CommandError::Usage(format!("rename must look like <layer id>=<name>: {value}"))
            })?;
            let id = id
                .trim()
                .parse::<i64>()
                .map_err(|_| CommandError::Usage(format!("invalid layer id in rename: {value}")))?;
            Ok((parse_layer_id(id)?, name.trim().to_string()))
        })
        .collect()
}

/// Copies the source document into `uploads_dir` under a name that cannot
/// collide with an earlier upload of a different file.
fn copy_upload(source: &Path, uploads_dir: &Path) -> Result<PathBuf, CommandError> {
    if !source.is_file() {
        return Err(CommandError::Usage(format!(
            "not a file: {}",
            source.display()
        )));
    }
    if !is_supported_document(&source.to_string_lossy()) {
        return Err(CommandError::Usage(format!(
            "{} is not a layered document, expected one of: {}",
            source.display(),
            DOCUMENT_EXTENSIONS.join(", ")
        )));
    }
    let file_name = source
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let absolute = fs::canonicalize(source).map_err(|error| {
        CommandError::Runtime(format!("cannot resolve {}: {error}", source.display()))
    })?;
    let prefix = short_digest(&absolute.to_string_lossy(), 8);
    let target = uploads_dir.join(format!("{prefix}_{}", sanitize_filename(&file_name)));

    fs::copy(source, &target)
        .map_err(|error| CommandError::Runtime(format!("upload failed: {error}")))?;
    info!("stored upload at {}", target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn renames_parse_into_layer_ids() {
        let renames =
            parse_renames(&["4=hero".to_string(), " 9 = Call to action ".to_string()])
                .expect("renames");
        assert_eq!(
            renames.get(&LayerId::new(4).expect("id")).map(String::as_str),
            Some("hero")
        );
        assert_eq!(
            renames.get(&LayerId::new(9).expect("id")).map(String::as_str),
            Some("Call to action")
        );

        assert!(matches!(
            parse_renames(&["hero".to_string()]),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!(
            parse_renames(&["0=hero".to_string()]),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn upload_rejects_unsupported_files_before_copying() {
        let dir = TempDir::new().expect("tempdir");
        let uploads = dir.path().join("uploads");
        fs::create_dir_all(&uploads).expect("uploads");
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, b"hello").expect("write");

        let result = copy_upload(&notes, &uploads);

        assert!(matches!(result, Err(CommandError::Usage(_))));
        assert_eq!(fs::read_dir(&uploads).expect("read dir").count(), 0);
    }

    #[test]
    fn upload_keeps_sanitised_name_behind_digest() {
        let dir = TempDir::new().expect("tempdir");
        let uploads = dir.path().join("uploads");
        fs::create_dir_all(&uploads).expect("uploads");
        let source = dir.path().join("Home Page.PSD");
        fs::write(&source, b"8BPS").expect("write");

        let stored = copy_upload(&source, &uploads).expect("upload");

        let name = stored.file_name().expect("name").to_string_lossy().to_string();
        assert!(name.ends_with("_Home_Page.PSD"), "{name}");
        assert_eq!(name.len(), "12345678_Home_Page.PSD".len());
    }
}
