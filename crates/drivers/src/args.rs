use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "psd2img")]
#[command(about = "Export PSD layers, groups and slices as web-ready images")]
#[command(long_about = "Export PSD layers, groups and slices as web-ready images.

Decoding PSD/PSB files requires the `psd` cargo feature \
(`cargo build --features psd`); without it every `process` run fails.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a PSD/PSB file as a new pending project
    Create {
        /// Path of the source document; it is copied into the uploads directory
        psd: String,

        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// `normal` clips to the canvas, `aggressive` also trims transparency
        #[arg(short, long, default_value = "normal")]
        mode: String,

        /// Comma separated export scales, e.g. 1x,2x
        #[arg(short, long, default_value = "1x")]
        scales: String,
    },

    /// Export a pending project and wait for the job to finish
    Process { project_id: i64 },

    /// Show a project's status and settings
    Show { project_id: i64 },

    /// List the exported layer records of a project
    #[command(alias = "ls")]
    Layers { project_id: i64 },

    /// Copy processed layer images into the project's export directory
    Export {
        project_id: i64,

        /// Comma separated layer ids, as listed by `layers`
        #[arg(short, long, value_delimiter = ',', required = true)]
        layers: Vec<i64>,

        /// Comma separated scales to copy (defaults to 1x)
        #[arg(short, long)]
        scales: Option<String>,

        /// Empty the export directory first
        #[arg(long)]
        clear: bool,

        /// Rename a layer's files, as `<layer id>=<name>`; repeatable
        #[arg(short, long = "rename")]
        renames: Vec<String>,
    },

    /// Stop processing, remove exported files and reset to pending
    Reset { project_id: i64 },

    /// Delete a project with its records and exported files
    #[command(alias = "rm")]
    Delete { project_id: i64 },
}
