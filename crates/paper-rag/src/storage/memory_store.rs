use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::PassageStore;
use crate::search::{hybrid_rank, HybridSearchParams};
use crate::types::{HybridEmbedding, NewPassage, PassageRecord};

/// In-process passage store with brute-force search.
pub struct MemoryStore {
    records: RwLock<Vec<PassageRecord>>,
    sparse_drop_ratio: f32,
}

impl MemoryStore {
    pub fn new(sparse_drop_ratio: f32) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            sparse_drop_ratio,
        }
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(0.2)
    }
}

#[async_trait]
impl PassageStore for MemoryStore {
    async fn insert(&self, passages: Vec<NewPassage>) -> Result<usize> {
        let count = passages.len();
        let mut records = self.records.write();
        records.extend(passages.into_iter().map(|p| PassageRecord {
            id: Uuid::new_v4().to_string(),
            text: p.text,
            dense: p.embedding.dense,
            sparse: p.embedding.sparse.pruned(self.sparse_drop_ratio),
        }));
        Ok(count)
    }

    async fn hybrid_search(
        &self,
        query: &HybridEmbedding,
        params: &HybridSearchParams,
    ) -> Result<Vec<String>> {
        let records = self.records.read();
        let ids = hybrid_rank(&records, query, params);
        Ok(ids
            .iter()
            .filter_map(|id| records.iter().find(|r| &r.id == id))
            .map(|r| r.text.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}
