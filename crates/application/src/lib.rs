mod cancel;
mod error;
mod exporter;
mod ports;
mod processor;
mod service;
mod tasks;
mod use_cases;

#[cfg(test)]
mod testing;

pub use cancel::CancellationToken;
pub use error::ApplicationError;
pub use exporter::{classify, ExportSettings, LayerExporter};
pub use ports::{
    AssetWriter, Clock, Document, DocumentHeader, DocumentNode, DocumentRenderer, NewLayer,
    NewProject, ProjectStore, SliceInfo, TextInfo, TextPayload,
};
pub use processor::{project_output_dir, ProcessReport, ProjectProcessor};
pub use service::ExportService;
pub use tasks::TaskRunner;
pub use use_cases::{
    BootstrapStoreCommand, CreateProjectCommand, DeleteProjectCommand, ExportLayersCommand,
    ExportSummary, ListLayersCommand, ShowProjectCommand, StartProcessingCommand,
    StopProcessingCommand, WaitProcessingCommand,
};
