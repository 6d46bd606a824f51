//! Retrieval core: chunk documents, embed them, persist a similarity index
//! and answer queries with MMR-diversified results.

pub mod builder;
pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod embeddings_hash;
pub mod embeddings_openai;
pub mod error;
pub mod mmr;
pub mod quantize;
pub mod retriever;
pub mod search;
pub mod store;

pub use {
    builder::{BuildReport, IndexBuilder},
    chunker::{Chunk, TextChunker},
    config::{BuildOptions, RetrieveOptions},
    embeddings::{EmbeddingProvider, provider_from_config},
    embeddings_hash::HashEmbedder,
    embeddings_openai::OpenAiEmbeddingProvider,
    error::{Result, RetrievalError},
    retriever::{RetrievalResult, RetrievedChunk, Retriever},
    store::{ChunkRecord, IndexMeta},
};
