//! Passage storage backends. The retriever only sees [`PassageStore`].

use anyhow::Result;
use async_trait::async_trait;

use crate::search::HybridSearchParams;
use crate::types::{HybridEmbedding, NewPassage};

pub mod lance_store;
pub mod memory_store;

pub use lance_store::LanceStore;
pub use memory_store::MemoryStore;

#[async_trait]
pub trait PassageStore: Send + Sync {
    /// Insert passages, pruning their sparse vectors first. Returns the
    /// number of records written.
    async fn insert(&self, passages: Vec<NewPassage>) -> Result<usize>;

    /// Dense + sparse search fused with RRF. Returns passage texts in fused
    /// order, at most `params.fusion_limit` of them.
    async fn hybrid_search(
        &self,
        query: &HybridEmbedding,
        params: &HybridSearchParams,
    ) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize>;
}
