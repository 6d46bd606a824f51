use std::path::PathBuf;

use {finrag_kb::KbError, thiserror::Error};

pub type Result<T, E = RetrievalError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Manifest could not be read; fatal to a build.
    #[error(transparent)]
    Kb(#[from] KbError),

    #[error("no texts found to index; check manifest paths and docs dir")]
    NoChunks,

    #[error("index not found in {}; run `finrag build` first", dir.display())]
    IndexNotFound { dir: PathBuf },

    #[error(
        "index was built with embedder {index_name} (dim {index_dim}) but the active embedder is \
         {active_name} (dim {active_dim}); rebuild with --force"
    )]
    EmbedderMismatch {
        index_name: String,
        index_dim: usize,
        active_name: String,
        active_dim: usize,
    },

    /// The index location holds something other than an index.
    #[error(
        "{} exists and is not an index directory; refusing to replace it",
        dir.display()
    )]
    NotAnIndexDir { dir: PathBuf },

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("embedding failed")]
    Embedder(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RetrievalError {
    /// True when the index has not been built yet, as opposed to a query
    /// that simply matched nothing.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::IndexNotFound { .. })
    }
}
