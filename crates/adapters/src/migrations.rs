pub const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        psd_path TEXT NOT NULL,
        export_path TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'pending',
        export_scales TEXT NOT NULL DEFAULT '[\"1x\"]',
        width INTEGER NOT NULL DEFAULT 0,
        height INTEGER NOT NULL DEFAULT 0,
        processing_mode TEXT NOT NULL DEFAULT 'normal',
        processing_started_at TEXT,
        processing_finished_at TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS layers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        resource_id TEXT NOT NULL,
        name TEXT NOT NULL,
        layer_type TEXT NOT NULL,
        x INTEGER NOT NULL,
        y INTEGER NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        content TEXT,
        image_path TEXT NOT NULL DEFAULT '',
        metadata TEXT NOT NULL DEFAULT '{}',
        parent_id INTEGER REFERENCES layers(id) ON DELETE CASCADE,
        hidden INTEGER NOT NULL DEFAULT 0
    );",
    "CREATE INDEX IF NOT EXISTS idx_layers_project_id ON layers(project_id);",
    "CREATE INDEX IF NOT EXISTS idx_layers_layer_type ON layers(layer_type);",
];
