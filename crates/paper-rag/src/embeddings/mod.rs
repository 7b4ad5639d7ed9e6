pub mod bge_m3;

pub use bge_m3::{BgeM3Config, BgeM3Embeddings};

use anyhow::Result;

use crate::types::HybridEmbedding;

/// Hybrid (dense + sparse) embedding model. Implementations are blocking;
/// async callers go through `spawn_blocking`.
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query
    fn embed_query(&self, text: &str) -> Result<HybridEmbedding>;

    /// Batch embed passages for ingestion
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<HybridEmbedding>>;

    /// Dense vector dimension
    fn dimension(&self) -> usize;
}
