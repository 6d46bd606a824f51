use finrag_config::RagConfig;

/// Parameters for one index build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Target chunk size in characters.
    pub chunk_size_chars: usize,
    /// Overlap between hard-sliced windows of an oversized paragraph.
    pub overlap_chars: usize,
    /// Rebuild even when a complete index already exists.
    pub force: bool,
    /// Also persist an int8 copy of the matrix.
    pub quantize: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            chunk_size_chars: 1400,
            overlap_chars: 200,
            force: false,
            quantize: true,
        }
    }
}

impl BuildOptions {
    pub fn from_config(rag: &RagConfig) -> Self {
        Self {
            chunk_size_chars: rag.chunk_size_chars,
            overlap_chars: rag.overlap_chars,
            force: false,
            quantize: rag.quantize,
        }
    }
}

/// Per-query retrieval parameters.
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub top_k: usize,
    pub use_mmr: bool,
    /// Weight of query relevance against redundancy (clamped to 0.0–1.0).
    pub mmr_lambda: f32,
    /// Candidates scoring below this similarity are dropped.
    pub min_score: f32,
    /// Restrict candidates to one category (case-insensitive).
    pub category: Option<String>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            use_mmr: true,
            mmr_lambda: 0.7,
            min_score: 0.0,
            category: None,
        }
    }
}

impl RetrieveOptions {
    pub fn from_config(rag: &RagConfig) -> Self {
        Self {
            top_k: rag.top_k,
            use_mmr: rag.use_mmr,
            mmr_lambda: rag.mmr_lambda,
            min_score: rag.min_score,
            category: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_mmr(mut self, use_mmr: bool) -> Self {
        self.use_mmr = use_mmr;
        self
    }

    pub fn with_lambda(mut self, lambda: f32) -> Self {
        self.mmr_lambda = lambda;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}
