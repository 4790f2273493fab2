use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{ExportScale, ProjectId};

pub const MAX_FILENAME_CHARS: usize = 50;

/// Layered document formats accepted as project sources.
pub const DOCUMENT_EXTENSIONS: [&str; 2] = ["psd", "psb"];

const UNSAFE_CHARS: [char; 10] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '];

/// Makes a node name usable as part of a file name: path-unsafe characters
/// and spaces become `_`, the result is capped at [`MAX_FILENAME_CHARS`]
/// characters, and names that end up blank are replaced by a digest of the
/// original name.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|ch| {
            if UNSAFE_CHARS.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    if sanitized.trim_matches(|ch: char| ch == '_' || ch.is_whitespace()).is_empty() {
        return short_digest(name, 12);
    }
    sanitized
}

/// First `len` hex characters of the SHA-256 digest of `input`.
pub fn short_digest(input: &str, len: usize) -> String {
    let mut encoded = hex::encode(Sha256::digest(input.as_bytes()));
    encoded.truncate(len);
    encoded
}

/// Slices are named by a digest of project and slice id rather than by the
/// user-supplied slice name.
pub fn slice_filename(project_id: ProjectId, slice_id: u32) -> String {
    let digest = short_digest(&format!("slice_{}_{}", project_id.get(), slice_id), 8);
    format!("slice_{digest}.png")
}

/// True when `path` ends in one of [`DOCUMENT_EXTENSIONS`], in any case.
pub fn is_supported_document(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            DOCUMENT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// `foo.png` stays as is at 1x; other scales become `foo@2x.png`.
pub fn scaled_filename(base_filename: &str, scale: ExportScale) -> String {
    if scale.is_base() {
        return base_filename.to_string();
    }
    let path = Path::new(base_filename);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| base_filename.to_string());
    match path.extension() {
        Some(ext) => format!("{stem}@{scale}.{}", ext.to_string_lossy()),
        None => format!("{stem}@{scale}"),
    }
}
