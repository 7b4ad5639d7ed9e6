pub mod cross_encoder;

pub use cross_encoder::CrossEncoderReranker;

use anyhow::Result;

use crate::types::RankedPassage;

/// Relevance scorer for (query, passage) pairs. Blocking, like
/// [`crate::embeddings::EmbeddingModel`].
pub trait Reranker: Send + Sync {
    /// Score `documents` against `query` and return at most `top_k`,
    /// best first.
    fn rerank(&self, query: &str, documents: &[String], top_k: usize) -> Result<Vec<RankedPassage>>;
}

/// Pair documents with scores and keep the best `top_k`. Equal scores
/// keep input order.
pub(crate) fn top_k_by_score(documents: &[String], scores: &[f32], top_k: usize) -> Vec<RankedPassage> {
    let mut ranked: Vec<RankedPassage> = documents
        .iter()
        .zip(scores)
        .map(|(text, &score)| RankedPassage {
            text: text.clone(),
            score,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(top_k);
    ranked
}
