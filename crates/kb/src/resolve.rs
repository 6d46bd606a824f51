use std::path::{Path, PathBuf};

/// Locate a manifest document on disk.
///
/// `local_path` is tried as given (relative paths resolve against the working
/// directory, backslashes are treated as separators), then by file name under
/// `docs_dir`.
pub fn resolve_document_path(local_path: &str, docs_dir: &Path) -> Option<PathBuf> {
    let normalized = local_path.trim().replace('\\', "/");
    if normalized.is_empty() {
        return None;
    }

    let candidate = PathBuf::from(&normalized);
    if candidate.is_file() {
        return Some(candidate);
    }

    let fallback = docs_dir.join(candidate.file_name()?);
    fallback.is_file().then_some(fallback)
}
