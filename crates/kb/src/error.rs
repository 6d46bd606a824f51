use std::path::PathBuf;

use thiserror::Error;

/// Failures reading knowledge-base inputs.
#[derive(Debug, Error)]
pub enum KbError {
    #[error("KB manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("glossary not found: {}", .0.display())]
    GlossaryNotFound(PathBuf),

    /// A CSV input lacks required header columns.
    #[error("{kind} missing columns: {missing:?}. Found: {found:?}")]
    MissingColumns {
        kind: &'static str,
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
