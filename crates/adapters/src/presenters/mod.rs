use psd2img_application::ExportSummary;
use psd2img_domain::{LayerRecord, Project};

pub fn present_project(project: &Project) -> String {
    let scales = project
        .effective_scales()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    [
        format!("project {} {:?}", project.id, project.name),
        format!("  status: {}", project.status),
        format!("  source: {}", project.psd_path),
        format!("  exports: {}", display_or_dash(&project.export_path)),
        format!("  canvas: {}x{}", project.width, project.height),
        format!("  mode: {}", project.processing_mode),
        format!("  scales: {scales}"),
        format!(
            "  started: {}",
            project.processing_started_at.as_deref().unwrap_or("-")
        ),
        format!(
            "  finished: {}",
            project.processing_finished_at.as_deref().unwrap_or("-")
        ),
    ]
    .join("\n")
}

pub fn present_export_summary(summary: &ExportSummary) -> String {
    format!(
        "exported {} layers ({} files) to {}",
        summary.layers_exported,
        summary.files_copied,
        summary.export_dir.display()
    )
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

pub fn present_layer_row(layer: &LayerRecord) -> String {
    let parent = layer
        .parent_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let hidden = if layer.hidden { " (hidden)" } else { "" };
    format!(
        "{}\t{}\t{}\t{},{} {}x{}\t{}\t{}{}",
        layer.id,
        parent,
        layer.kind,
        layer.bounds.x,
        layer.bounds.y,
        layer.bounds.width,
        layer.bounds.height,
        layer.name,
        layer.image_path,
        hidden
    )
}
