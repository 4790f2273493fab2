use rusqlite::{params, Connection, OptionalExtension, Result, Row};

/// Raw `projects` row; conversion into domain types happens in the
/// repository so id and enum validation errors surface as `ApplicationError`.
#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: i64,
    pub name: String,
    pub psd_path: String,
    pub export_path: String,
    pub status: String,
    pub export_scales: String,
    pub width: i64,
    pub height: i64,
    pub processing_mode: String,
    pub processing_started_at: Option<String>,
    pub processing_finished_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LayerRow {
    pub id: i64,
    pub project_id: i64,
    pub resource_id: String,
    pub name: String,
    pub layer_type: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub content: Option<String>,
    pub image_path: String,
    pub metadata: String,
    pub parent_id: Option<i64>,
    pub hidden: bool,
}

const PROJECT_COLUMNS: &str = "id, name, psd_path, export_path, status, export_scales, width, \
     height, processing_mode, processing_started_at, processing_finished_at";

const LAYER_COLUMNS: &str = "id, project_id, resource_id, name, layer_type, x, y, width, height, \
     content, image_path, metadata, parent_id, hidden";

pub fn insert_project(
    conn: &Connection,
    name: &str,
    psd_path: &str,
    export_path: &str,
    export_scales: &str,
    processing_mode: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO projects (name, psd_path, export_path, status, export_scales, processing_mode)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5)",
        params![name, psd_path, export_path, export_scales, processing_mode],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_project(conn: &Connection, project_id: i64) -> Result<Option<ProjectRow>> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
        params![project_id],
        project_row,
    )
    .optional()
}

pub fn update_project(conn: &Connection, row: &ProjectRow) -> Result<usize> {
    conn.execute(
        "UPDATE projects SET
            name = ?2,
            psd_path = ?3,
            export_path = ?4,
            status = ?5,
            export_scales = ?6,
            width = ?7,
            height = ?8,
            processing_mode = ?9,
            processing_started_at = ?10,
            processing_finished_at = ?11
         WHERE id = ?1",
        params![
            row.id,
            row.name,
            row.psd_path,
            row.export_path,
            row.status,
            row.export_scales,
            row.width,
            row.height,
            row.processing_mode,
            row.processing_started_at,
            row.processing_finished_at,
        ],
    )
}

pub fn delete_project(conn: &Connection, project_id: i64) -> Result<usize> {
    conn.execute("DELETE FROM projects WHERE id = ?1", params![project_id])
}

pub fn insert_layer(conn: &Connection, row: &LayerRow) -> Result<i64> {
    conn.execute(
        "INSERT INTO layers
         (project_id, resource_id, name, layer_type, x, y, width, height,
          content, image_path, metadata, parent_id, hidden)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            row.project_id,
            row.resource_id,
            row.name,
            row.layer_type,
            row.x,
            row.y,
            row.width,
            row.height,
            row.content,
            row.image_path,
            row.metadata,
            row.parent_id,
            row.hidden,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_layers(conn: &Connection, project_id: i64) -> Result<Vec<LayerRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LAYER_COLUMNS}
         FROM layers
         WHERE project_id = ?1
         ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(params![project_id], layer_row)?;
    rows.collect()
}

/// Counted up front: rows removed by the parent cascade are not reported by
/// `changes()`.
pub fn delete_layers(conn: &Connection, project_id: i64) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM layers WHERE project_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    conn.execute("DELETE FROM layers WHERE project_id = ?1", params![project_id])?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn project_row(row: &Row<'_>) -> Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        name: row.get(1)?,
        psd_path: row.get(2)?,
        export_path: row.get(3)?,
        status: row.get(4)?,
        export_scales: row.get(5)?,
        width: row.get(6)?,
        height: row.get(7)?,
        processing_mode: row.get(8)?,
        processing_started_at: row.get(9)?,
        processing_finished_at: row.get(10)?,
    })
}

fn layer_row(row: &Row<'_>) -> Result<LayerRow> {
    Ok(LayerRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        resource_id: row.get(2)?,
        name: row.get(3)?,
        layer_type: row.get(4)?,
        x: row.get(5)?,
        y: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        content: row.get(9)?,
        image_path: row.get(10)?,
        metadata: row.get(11)?,
        parent_id: row.get(12)?,
        hidden: row.get(13)?,
    })
}
