//! Manifest → chunks → embeddings → persisted index.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use {
    finrag_kb::{load_manifest, resolve_document_path},
    serde::Serialize,
    tracing::{info, warn},
};

use crate::{
    chunker::TextChunker,
    config::BuildOptions,
    embeddings::{EmbeddingProvider, l2_normalize},
    error::{Result, RetrievalError},
    quantize::QuantizedMatrix,
    store::{self, ChunkRecord, EmbeddingMatrix, IndexMeta},
};

/// Outcome of [`IndexBuilder::build`].
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub index_dir: PathBuf,
    /// True when an existing index was kept and nothing was written.
    pub skipped: bool,
    pub total_chunks: usize,
    pub documents_indexed: usize,
    /// doc_ids whose files could not be found or read.
    pub missing_documents: Vec<String>,
}

pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    options: BuildOptions,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, options: BuildOptions) -> Self {
        Self { embedder, options }
    }

    /// Build the index for `manifest_path` into `index_dir`.
    ///
    /// Without `force` an existing complete index is left untouched.
    /// Documents whose files are missing are skipped with a warning; a
    /// manifest that yields no chunks at all is an error.
    pub async fn build(
        &self,
        manifest_path: &Path,
        docs_dir: &Path,
        index_dir: &Path,
    ) -> Result<BuildReport> {
        if !self.options.force && store::index_exists(index_dir) {
            let meta = store::read_index_meta(index_dir)?;
            info!(
                dir = %index_dir.display(),
                chunks = meta.total_chunks,
                "index already exists, use --force to rebuild"
            );
            return Ok(BuildReport {
                index_dir: index_dir.to_path_buf(),
                skipped: true,
                total_chunks: meta.total_chunks,
                documents_indexed: 0,
                missing_documents: Vec::new(),
            });
        }

        store::check_index_target(index_dir)?;
        let started = Instant::now();
        let documents = load_manifest(manifest_path)?;
        let chunker = TextChunker::new(self.options.chunk_size_chars, self.options.overlap_chars);

        let mut records = Vec::new();
        let mut missing = Vec::new();
        let mut documents_indexed = 0;

        for doc in &documents {
            let Some(path) = resolve_document_path(&doc.local_path, docs_dir) else {
                warn!(doc_id = %doc.doc_id, local_path = %doc.local_path, "missing doc file, skipping");
                missing.push(doc.doc_id.clone());
                continue;
            };
            let text = match tokio::fs::read(&path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    warn!(doc_id = %doc.doc_id, path = %path.display(), error = %e, "unreadable doc file, skipping");
                    missing.push(doc.doc_id.clone());
                    continue;
                },
            };

            let chunks = chunker.chunk_document(&doc.doc_id, &text);
            if !chunks.is_empty() {
                documents_indexed += 1;
            }
            records.extend(chunks.into_iter().map(|chunk| ChunkRecord {
                doc_id: doc.doc_id.clone(),
                chunk_id: chunk.chunk_id,
                title: doc.title.clone(),
                category: doc.category.clone(),
                sub_category: doc.sub_category.clone(),
                url: doc.source_url.clone(),
                local_path: doc.local_path.clone(),
                text: chunk.text,
            }));
        }

        if records.is_empty() {
            return Err(RetrievalError::NoChunks);
        }

        info!(
            chunks = records.len(),
            documents = documents_indexed,
            embedder = self.embedder.model_name(),
            "embedding chunks"
        );
        let matrix = self.embed_records(&records).await?;
        let quantized = self
            .options
            .quantize
            .then(|| QuantizedMatrix::quantize(&matrix));

        let meta = IndexMeta {
            embedder_name: self.embedder.model_name().to_string(),
            dim: matrix.dim(),
            created_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            chunk_size_chars: chunker.chunk_size(),
            overlap_chars: chunker.overlap(),
            total_chunks: records.len(),
        };

        let total_chunks = records.len();
        let dir = index_dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            store::write_index(&dir, &meta, &records, &matrix, quantized.as_ref())
        })
        .await
        .map_err(|e| RetrievalError::Io(std::io::Error::other(e)))??;

        info!(
            dir = %index_dir.display(),
            chunks = total_chunks,
            missing = missing.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index built"
        );
        Ok(BuildReport {
            index_dir: index_dir.to_path_buf(),
            skipped: false,
            total_chunks,
            documents_indexed,
            missing_documents: missing,
        })
    }

    async fn embed_records(&self, records: &[ChunkRecord]) -> Result<EmbeddingMatrix> {
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let mut vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(RetrievalError::Embedder)?;

        if vectors.len() != texts.len() {
            return Err(RetrievalError::Embedder(anyhow::anyhow!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                texts.len()
            )));
        }
        let dim = self.embedder.dimensions();
        if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
            return Err(RetrievalError::Embedder(anyhow::anyhow!(
                "vector {bad} has dimension {}, expected {dim}",
                vectors[bad].len()
            )));
        }

        vectors.iter_mut().for_each(|v| l2_normalize(v));
        EmbeddingMatrix::from_rows(dim, vectors)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::embeddings_hash::HashEmbedder,
        async_trait::async_trait,
        std::fs,
    };

    const HEADER: &str = "doc_id,title,category,sub_category,source_url,local_path\n";

    fn write_corpus(root: &Path, docs: &[(&str, Option<&str>)]) -> (PathBuf, PathBuf) {
        let docs_dir = root.join("docs");
        fs::create_dir_all(&docs_dir).unwrap();
        let mut csv = HEADER.to_string();
        for (id, body) in docs {
            csv.push_str(&format!("{id},Title {id},stocks,basics,https://example.com/{id},docs/{id}.md\n"));
            if let Some(body) = body {
                fs::write(docs_dir.join(format!("{id}.md")), body).unwrap();
            }
        }
        let manifest = root.join("manifest.csv");
        fs::write(&manifest, csv).unwrap();
        (manifest, docs_dir)
    }

    fn builder(options: BuildOptions) -> IndexBuilder {
        IndexBuilder::new(Arc::new(HashEmbedder::new(64)), options)
    }

    #[tokio::test]
    async fn builds_and_reports_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let (manifest, docs) = write_corpus(
            tmp.path(),
            &[("kb-1", Some("Stocks are shares.")), ("kb-2", None), ("kb-3", Some("Bonds are loans."))],
        );
        let index = tmp.path().join("index");

        let report = builder(BuildOptions::default())
            .build(&manifest, &docs, &index)
            .await
            .unwrap();

        assert!(!report.skipped);
        assert_eq!(report.total_chunks, 2);
        assert_eq!(report.documents_indexed, 2);
        assert_eq!(report.missing_documents, vec!["kb-2"]);

        let stored = store::read_index(&index).unwrap();
        assert_eq!(stored.meta.embedder_name, "hash");
        assert_eq!(stored.meta.dim, 64);
        assert_eq!(stored.meta.total_chunks, 2);
        assert_eq!(stored.records[0].chunk_id, "kb-1::c000");
        assert_eq!(stored.records[1].url, "https://example.com/kb-3");
        assert!(stored.quantized.is_some());
        assert!(stored.meta.created_at.ends_with('Z'));
    }

    #[tokio::test]
    async fn skips_existing_index_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let (manifest, docs) = write_corpus(tmp.path(), &[("kb-1", Some("Stocks."))]);
        let index = tmp.path().join("index");
        builder(BuildOptions::default()).build(&manifest, &docs, &index).await.unwrap();

        let again = builder(BuildOptions::default())
            .build(&manifest, &docs, &index)
            .await
            .unwrap();
        assert!(again.skipped);
        assert_eq!(again.total_chunks, 1);

        let forced = builder(BuildOptions {
            force: true,
            quantize: false,
            ..Default::default()
        })
        .build(&manifest, &docs, &index)
        .await
        .unwrap();
        assert!(!forced.skipped);
        assert!(!index.join(store::QUANTIZED_FILE).exists());
    }

    #[tokio::test]
    async fn no_documents_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (manifest, docs) = write_corpus(tmp.path(), &[("kb-1", None), ("kb-2", Some("  \n\n "))]);
        let index = tmp.path().join("index");

        let err = builder(BuildOptions::default())
            .build(&manifest, &docs, &index)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::NoChunks));
        assert!(!index.exists());
    }

    #[tokio::test]
    async fn missing_manifest_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = builder(BuildOptions::default())
            .build(&tmp.path().join("nope.csv"), tmp.path(), &tmp.path().join("index"))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Kb(_)));
    }

    struct ShortEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0])
        }

        fn model_name(&self) -> &str {
            "short"
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn rejects_vectors_of_wrong_dimension() {
        let tmp = tempfile::tempdir().unwrap();
        let (manifest, docs) = write_corpus(tmp.path(), &[("kb-1", Some("Stocks."))]);
        let err = IndexBuilder::new(Arc::new(ShortEmbedder), BuildOptions::default())
            .build(&manifest, &docs, &tmp.path().join("index"))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Embedder(_)));
    }
}
