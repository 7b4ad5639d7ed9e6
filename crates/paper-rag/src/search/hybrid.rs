use std::collections::HashMap;

use crate::config::SearchConfig;
use crate::types::{HybridEmbedding, PassageRecord, SparseVector};

/// Limits for one hybrid search call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridSearchParams {
    /// Per-branch cap for the dense and sparse candidate lists.
    pub candidate_limit: usize,
    /// Cap on the fused list.
    pub fusion_limit: usize,
    pub rrf_k: usize,
}

impl Default for HybridSearchParams {
    fn default() -> Self {
        Self {
            candidate_limit: 10,
            fusion_limit: 10,
            rrf_k: 60,
        }
    }
}

impl From<&SearchConfig> for HybridSearchParams {
    fn from(config: &SearchConfig) -> Self {
        Self {
            candidate_limit: config.candidate_limit,
            fusion_limit: config.fusion_limit,
            rrf_k: config.rrf_k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridSource {
    Dense,
    Sparse,
    Both,
}

/// Reciprocal Rank Fusion over the dense and sparse candidate lists.
/// Formula: rrf_score(doc) = Σ 1/(k + rank_i) for each list containing doc
///
/// Equal scores keep first-appearance order, dense list first.
pub fn reciprocal_rank_fusion(
    dense_results: &[(String, f32)],
    sparse_results: &[(String, f32)],
    k: usize,
    top_k: usize,
) -> Vec<(String, f32, HybridSource)> {
    let mut merged: Vec<(String, f32, HybridSource)> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    let branches = [
        (dense_results, HybridSource::Dense),
        (sparse_results, HybridSource::Sparse),
    ];
    for (results, source) in branches {
        for (rank, (id, _score)) in results.iter().enumerate() {
            let rrf = 1.0 / (k as f32 + rank as f32 + 1.0);
            match position.get(id) {
                Some(&i) => {
                    merged[i].1 += rrf;
                    if merged[i].2 != source {
                        merged[i].2 = HybridSource::Both;
                    }
                }
                None => {
                    position.insert(id.clone(), merged.len());
                    merged.push((id.clone(), rrf, source));
                }
            }
        }
    }

    // sort_by is stable, so ties stay in insertion order
    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(top_k);
    merged
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Top `limit` passages by cosine similarity to the dense query vector.
pub fn rank_dense<'a, I>(records: I, query: &[f32], limit: usize) -> Vec<(String, f32)>
where
    I: IntoIterator<Item = &'a PassageRecord>,
{
    top_by_score(
        records
            .into_iter()
            .map(|r| (r.id.clone(), cosine_similarity(&r.dense, query))),
        limit,
    )
}

/// Top `limit` passages by sparse inner product. Passages sharing no
/// weighted term with the query are not candidates.
pub fn rank_sparse<'a, I>(records: I, query: &SparseVector, limit: usize) -> Vec<(String, f32)>
where
    I: IntoIterator<Item = &'a PassageRecord>,
{
    top_by_score(
        records
            .into_iter()
            .map(|r| (r.id.clone(), r.sparse.dot(query)))
            .filter(|(_, score)| *score > 0.0),
        limit,
    )
}

/// Run both branches over an in-memory candidate set and fuse them.
/// Returns passage ids in fused order.
pub fn hybrid_rank<'a>(
    records: &'a [PassageRecord],
    query: &HybridEmbedding,
    params: &HybridSearchParams,
) -> Vec<String> {
    let dense = rank_dense(records, &query.dense, params.candidate_limit);
    let sparse = rank_sparse(records, &query.sparse, params.candidate_limit);
    reciprocal_rank_fusion(&dense, &sparse, params.rrf_k, params.fusion_limit)
        .into_iter()
        .map(|(id, _, _)| id)
        .collect()
}

fn top_by_score(scored: impl Iterator<Item = (String, f32)>, limit: usize) -> Vec<(String, f32)> {
    let mut scored: Vec<(String, f32)> = scored.collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize, prefix: &str) -> Vec<(String, f32)> {
        (0..n).map(|i| (format!("{}{}", prefix, i), 1.0 - i as f32 * 0.01)).collect()
    }

    fn record(id: &str, dense: Vec<f32>, sparse: &[(u32, f32)]) -> PassageRecord {
        PassageRecord {
            id: id.to_string(),
            text: format!("passage {}", id),
            dense,
            sparse: SparseVector {
                indices: sparse.iter().map(|(i, _)| *i).collect(),
                values: sparse.iter().map(|(_, v)| *v).collect(),
            },
        }
    }

    #[test]
    fn test_rrf_shared_hits_rank_first() {
        let dense = vec![("a".to_string(), 0.9), ("b".to_string(), 0.8)];
        let sparse = vec![("c".to_string(), 4.0), ("b".to_string(), 3.0)];
        let fused = reciprocal_rank_fusion(&dense, &sparse, 60, 10);

        assert_eq!(fused[0].0, "b");
        assert_eq!(fused[0].2, HybridSource::Both);
        assert!((fused[0].1 - (1.0 / 62.0 + 1.0 / 62.0)).abs() < 1e-6);
        // a and c tie at 1/61; dense hit first
        assert_eq!(fused[1].0, "a");
        assert_eq!(fused[2].0, "c");
    }

    #[test]
    fn test_rrf_respects_fusion_cap() {
        let fused = reciprocal_rank_fusion(&ids(10, "d"), &ids(10, "s"), 60, 10);
        assert_eq!(fused.len(), 10);

        let fused = reciprocal_rank_fusion(&ids(3, "d"), &[], 60, 10);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_sparse_branch_skips_disjoint_passages() {
        let records = vec![
            record("x", vec![1.0, 0.0], &[(5, 1.0)]),
            record("y", vec![0.0, 1.0], &[(7, 1.0)]),
        ];
        let query = SparseVector { indices: vec![7], values: vec![0.5] };
        let hits = rank_sparse(&records, &query, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "y");
    }

    #[test]
    fn test_hybrid_rank_caps_candidates() {
        let records: Vec<PassageRecord> = (0..25)
            .map(|i| record(&format!("p{}", i), vec![1.0, i as f32], &[(i as u32, 1.0), (100, 0.1)]))
            .collect();
        let query = HybridEmbedding {
            dense: vec![1.0, 3.0],
            sparse: SparseVector { indices: vec![3, 100], values: vec![1.0, 1.0] },
        };
        let fused = hybrid_rank(&records, &query, &HybridSearchParams::default());
        assert!(fused.len() <= 10);
        assert_eq!(fused[0], "p3");
    }
}
