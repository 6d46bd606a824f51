/// Provider-agnostic embedding trait for generating vectors from text.
use std::sync::Arc;

use {
    async_trait::async_trait,
    finrag_config::{EmbedderConfig, EmbedderProvider},
    tracing::info,
};

use crate::{embeddings_hash::HashEmbedder, embeddings_openai::OpenAiEmbeddingProvider};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts, one row per input in order.
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Identity recorded in the index metadata (e.g. "hash", "text-embedding-3-small").
    fn model_name(&self) -> &str;

    /// The dimensionality of the embeddings produced.
    fn dimensions(&self) -> usize;
}

/// Build the embedder selected by `config`.
///
/// Chosen once per process and shared by the builder and the retriever.
pub fn provider_from_config(config: &EmbedderConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbedderProvider::Hash => Arc::new(HashEmbedder::new(config.dim)),
        EmbedderProvider::OpenAi => {
            let Some(key) = config.api_key.clone() else {
                anyhow::bail!("openai embedder selected but no api key configured (set OPENAI_API_KEY)");
            };
            Arc::new(
                OpenAiEmbeddingProvider::new(key)
                    .with_model(config.model.clone(), config.dimensions)
                    .with_base_url(config.base_url.clone())
                    .with_batch_size(config.batch_size),
            )
        },
    };
    info!(
        model = provider.model_name(),
        dims = provider.dimensions(),
        "embedder ready"
    );
    Ok(provider)
}

/// Scale `v` to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product; equals cosine similarity for unit vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    #[test]
    fn normalize_produces_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
    }

    #[test]
    fn selects_hash_by_default() {
        let provider = provider_from_config(&EmbedderConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "hash");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn openai_requires_key() {
        let mut config = EmbedderConfig {
            provider: EmbedderProvider::OpenAi,
            ..Default::default()
        };
        assert!(provider_from_config(&config).is_err());

        config.api_key = Some(Secret::new("sk-test".into()));
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.dimensions(), 1536);
    }
}
