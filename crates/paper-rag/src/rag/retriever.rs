//! Multi-query hybrid retrieval: per query embed, hybrid search, rerank;
//! then merge the per-query results in query order.

use anyhow::anyhow;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::{call_collaborator, Collaborator, PipelineResult};
use crate::reranking::Reranker;
use crate::search::HybridSearchParams;
use crate::storage::PassageStore;

pub struct MultiQueryRetriever {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn PassageStore>,
    reranker: Arc<dyn Reranker>,
    params: HybridSearchParams,
    top_k: usize,
    timeout: Duration,
    parallel: bool,
}

impl MultiQueryRetriever {
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<dyn PassageStore>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker,
            params: HybridSearchParams::from(&config.search),
            top_k: config.reranker.top_k,
            timeout: config.search.collaborator_timeout(),
            parallel: config.search.parallel_queries,
        }
    }

    /// Retrieve for every query and return the distinct passages in query
    /// order. Any per-query failure fails the whole call.
    pub async fn retrieve(&self, queries: &[String]) -> PipelineResult<Vec<String>> {
        let per_query: Vec<Vec<String>> = if self.parallel {
            try_join_all(queries.iter().map(|q| self.retrieve_one(q))).await?
        } else {
            let mut results = Vec::with_capacity(queries.len());
            for query in queries {
                results.push(self.retrieve_one(query).await?);
            }
            results
        };

        let documents = unique_documents(per_query.into_iter().flatten());
        tracing::info!(queries = queries.len(), passages = documents.len(), "Retrieved passages");
        Ok(documents)
    }

    /// Top-k passages for a single query, reranked against that query's text.
    pub async fn retrieve_one(&self, query: &str) -> PipelineResult<Vec<String>> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let embedding = call_collaborator(
            Collaborator::Embedding,
            self.timeout,
            run_blocking(move || embedder.embed_query(&text)),
        )
        .await?;

        let candidates = call_collaborator(
            Collaborator::Search,
            self.timeout,
            self.store.hybrid_search(&embedding, &self.params),
        )
        .await?;

        if candidates.is_empty() {
            tracing::debug!(query = %query, "No candidates for query");
            return Ok(Vec::new());
        }

        let reranker = Arc::clone(&self.reranker);
        let text = query.to_string();
        let top_k = self.top_k;
        let candidate_count = candidates.len();
        let ranked = call_collaborator(
            Collaborator::Rerank,
            self.timeout,
            run_blocking(move || reranker.rerank(&text, &candidates, top_k)),
        )
        .await?;

        tracing::debug!(query = %query, candidates = candidate_count, kept = ranked.len(), "Reranked candidates");
        Ok(ranked.into_iter().map(|p| p.text).collect())
    }
}

/// Stable dedup by exact text; the first occurrence wins.
pub fn unique_documents<I>(documents: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|doc| seen.insert(doc.clone()))
        .collect()
}

async fn run_blocking<T, F>(f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("Blocking task failed: {}", e))?
}
