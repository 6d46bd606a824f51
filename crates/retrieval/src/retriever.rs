//! Query-time search over a persisted index.

use std::{path::PathBuf, sync::Arc};

use {
    serde::{Deserialize, Serialize},
    tokio::sync::OnceCell,
    tracing::{debug, info},
};

use crate::{
    config::RetrieveOptions,
    embeddings::{EmbeddingProvider, l2_normalize},
    error::{Result, RetrievalError},
    mmr::mmr_select,
    search::{Neighbor, NeighborSearch, select_strategy},
    store::{self, ChunkRecord, EmbeddingMatrix, IndexMeta},
};

/// Maximum snippet length in characters.
pub const SNIPPET_CHARS: usize = 280;

/// Candidates fetched per requested result before filtering and MMR.
const POOL_FACTOR: usize = 5;

/// One ranked chunk with what a caller needs to cite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub doc_id: String,
    pub chunk_id: String,
    pub title: String,
    pub url: String,
    pub category: String,
    pub snippet: String,
    /// Cosine similarity to the query.
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            chunks: Vec::new(),
        }
    }
}

struct LoadedIndex {
    meta: IndexMeta,
    records: Vec<ChunkRecord>,
    matrix: Arc<EmbeddingMatrix>,
    search: Box<dyn NeighborSearch>,
}

/// Loads an index lazily on first use and answers queries against it.
///
/// Safe to share behind an `Arc`; concurrent first calls load once.
pub struct Retriever {
    index_dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    loaded: OnceCell<LoadedIndex>,
}

impl Retriever {
    pub fn new(index_dir: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index_dir: index_dir.into(),
            embedder,
            loaded: OnceCell::new(),
        }
    }

    /// Load the index now instead of on the first query.
    pub async fn load(&self) -> Result<()> {
        self.index().await.map(|_| ())
    }

    /// Metadata of the loaded index.
    pub async fn index_meta(&self) -> Result<&IndexMeta> {
        Ok(&self.index().await?.meta)
    }

    async fn index(&self) -> Result<&LoadedIndex> {
        self.loaded.get_or_try_init(|| self.load_from_disk()).await
    }

    async fn load_from_disk(&self) -> Result<LoadedIndex> {
        let dir = self.index_dir.clone();
        let stored = tokio::task::spawn_blocking(move || store::read_index(&dir))
            .await
            .map_err(|e| RetrievalError::Io(std::io::Error::other(e)))??;

        let active_name = self.embedder.model_name();
        let active_dim = self.embedder.dimensions();
        if stored.meta.embedder_name != active_name || stored.meta.dim != active_dim {
            return Err(RetrievalError::EmbedderMismatch {
                index_name: stored.meta.embedder_name,
                index_dim: stored.meta.dim,
                active_name: active_name.to_string(),
                active_dim,
            });
        }

        let matrix = Arc::new(stored.matrix);
        let search = select_strategy(Arc::clone(&matrix), stored.quantized);
        info!(
            dir = %self.index_dir.display(),
            chunks = stored.records.len(),
            embedder = %stored.meta.embedder_name,
            strategy = search.name(),
            "index loaded"
        );
        Ok(LoadedIndex {
            meta: stored.meta,
            records: stored.records,
            matrix,
            search,
        })
    }

    /// Rank chunks for `query`.
    ///
    /// Returns an empty result for a blank query, `top_k == 0`, an unknown
    /// category, or when nothing clears `min_score`. Fails with
    /// [`RetrievalError::IndexNotFound`] until the index has been built.
    pub async fn retrieve(&self, query: &str, opts: &RetrieveOptions) -> Result<RetrievalResult> {
        let index = self.index().await?;

        let query = query.trim();
        if query.is_empty() {
            return Ok(RetrievalResult::empty(""));
        }
        if opts.top_k == 0 {
            return Ok(RetrievalResult::empty(query));
        }

        let mut qvec = self
            .embedder
            .embed(query)
            .await
            .map_err(RetrievalError::Embedder)?;
        if qvec.len() != index.matrix.dim() {
            return Err(RetrievalError::Embedder(anyhow::anyhow!(
                "query vector has dimension {}, index has {}",
                qvec.len(),
                index.matrix.dim()
            )));
        }
        l2_normalize(&mut qvec);

        let allowed = opts.category.as_deref().map(|c| category_rows(&index.records, c));
        if allowed.as_ref().is_some_and(Vec::is_empty) {
            debug!(category = ?opts.category, "no chunks in category");
            return Ok(RetrievalResult::empty(query));
        }

        let pool_size = opts.top_k.saturating_mul(POOL_FACTOR).max(opts.top_k);
        let pool: Vec<_> = index
            .search
            .search(&qvec, pool_size, allowed.as_deref())
            .into_iter()
            .filter(|n| n.score >= opts.min_score)
            .collect();

        let pool_len = pool.len();
        let selected: Vec<Neighbor> = if opts.use_mmr && pool.len() > opts.top_k {
            let vectors: Vec<&[f32]> = pool.iter().map(|n| index.matrix.row(n.row)).collect();
            mmr_select(&qvec, &vectors, opts.top_k, opts.mmr_lambda)
                .into_iter()
                .map(|i| pool[i])
                .collect()
        } else {
            pool.into_iter().take(opts.top_k).collect()
        };

        let mut chunks: Vec<RetrievedChunk> = selected
            .into_iter()
            .map(|n| {
                let r = &index.records[n.row];
                RetrievedChunk {
                    doc_id: r.doc_id.clone(),
                    chunk_id: r.chunk_id.clone(),
                    title: r.title.clone(),
                    url: r.url.clone(),
                    category: r.category.clone(),
                    snippet: snippet(&r.text, SNIPPET_CHARS),
                    score: n.score,
                }
            })
            .collect();
        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(
            query,
            pool = pool_len,
            results = chunks.len(),
            mmr = opts.use_mmr,
            "retrieved"
        );
        Ok(RetrievalResult {
            query: query.to_string(),
            chunks,
        })
    }
}

fn category_rows(records: &[ChunkRecord], category: &str) -> Vec<usize> {
    let wanted = category.trim().to_lowercase();
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.category.trim().to_lowercase() == wanted)
        .map(|(i, _)| i)
        .collect()
}

/// Collapse whitespace and cut to `max_chars`, marking the cut with `…`.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(max_chars).collect();
    out.push('…');
    out
}
