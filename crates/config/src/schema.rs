/// Config schema types (app, paths, rag, embedder).
use std::path::PathBuf;

use {
    secrecy::Secret,
    serde::{Deserialize, Deserializer, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinragConfig {
    pub app: AppConfig,
    pub paths: PathsConfig,
    pub rag: RagConfig,
    pub embedder: EmbedderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

/// Knowledge-base input and index locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub kb_manifest: PathBuf,
    pub kb_docs_dir: PathBuf,
    pub kb_glossary: PathBuf,
    pub kb_index_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            kb_manifest: PathBuf::from("data/kb/knowledge_base_manifest.csv"),
            kb_docs_dir: PathBuf::from("data/kb/docs"),
            kb_glossary: PathBuf::from("data/kb/glossary.csv"),
            kb_index_dir: PathBuf::from("data/kb/index"),
        }
    }
}

/// Retrieval defaults and chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
    pub use_mmr: bool,
    /// Relevance/diversity trade-off (0.0 = diversity, 1.0 = relevance).
    pub mmr_lambda: f32,
    pub min_score: f32,
    pub chunk_size_chars: usize,
    pub overlap_chars: usize,
    /// Persist an int8 copy of the matrix for the two-stage scan.
    pub quantize: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            use_mmr: true,
            mmr_lambda: 0.7,
            min_score: 0.2,
            chunk_size_chars: 1400,
            overlap_chars: 200,
            quantize: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderProvider {
    /// Deterministic offline hashed bag-of-tokens.
    #[default]
    Hash,
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    OpenAi,
}

impl EmbedderProvider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hash" => Some(Self::Hash),
            "openai" | "open-ai" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub provider: EmbedderProvider,
    /// Vector dimension of the hash embedder.
    pub dim: usize,
    pub model: String,
    /// Vector dimension reported by the remote model.
    pub dimensions: usize,
    pub base_url: String,
    /// Falls back to `OPENAI_API_KEY` when unset.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub api_key: Option<Secret<String>>,
    pub batch_size: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::Hash,
            dim: 384,
            model: "text-embedding-3-small".into(),
            dimensions: 1536,
            base_url: "https://api.openai.com".into(),
            api_key: None,
            batch_size: 256,
        }
    }
}

impl std::fmt::Debug for EmbedderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedderConfig")
            .field("provider", &self.provider)
            .field("dim", &self.dim)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(Secret::new))
}
