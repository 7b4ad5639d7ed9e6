use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::PassageStore;
use crate::search::{reciprocal_rank_fusion, HybridSearchParams};
use crate::types::{HybridEmbedding, NewPassage, SparseVector};

const SEED_ID: &str = "__seed__";

/// LanceDB-backed passage store. Dense search runs inside LanceDB; sparse
/// vectors are stored as JSON and scored by inner product over a scan.
pub struct LanceStore {
    db: lancedb::Connection,
    dimension: usize,
    table_name: String,
    sparse_drop_ratio: f32,
}

impl LanceStore {
    pub async fn open(path: &Path, dimension: usize, sparse_drop_ratio: f32) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create store directory {}", path.display()))?;
        let uri = path.to_string_lossy();
        let db = lancedb::connect(&uri)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let store = Self {
            db,
            dimension,
            table_name: "passages".to_string(),
            sparse_drop_ratio,
        };

        store.ensure_table().await?;
        Ok(store)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            ),
            Field::new("sparse_json", DataType::Utf8, false),
            Field::new("created_at", DataType::Int64, false),
        ]))
    }

    fn build_batch(
        &self,
        ids: Vec<String>,
        texts: Vec<String>,
        flat_vectors: Vec<f32>,
        sparse_jsons: Vec<String>,
        created_ats: Vec<i64>,
    ) -> Result<RecordBatch> {
        let values = Float32Array::from(flat_vectors);
        let vector_field = Field::new("item", DataType::Float32, true);
        let vector_array = FixedSizeListArray::new(
            Arc::new(vector_field),
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        );

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(StringArray::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(texts)),
                Arc::new(vector_array) as Arc<dyn Array>,
                Arc::new(StringArray::from(sparse_jsons)),
                Arc::new(Int64Array::from(created_ats)),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if !names.contains(&self.table_name) {
            // Create with a single seed record, then delete it
            let batch = self.build_batch(
                vec![SEED_ID.to_string()],
                vec![String::new()],
                vec![0.0f32; self.dimension],
                vec!["{}".to_string()],
                vec![0],
            )?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], self.schema());
            self.db
                .create_table(&self.table_name, Box::new(batches))
                .execute()
                .await
                .context("Failed to create passages table")?;

            let table = self.db.open_table(&self.table_name).execute().await?;
            if let Err(e) = table.delete(&format!("id = '{}'", SEED_ID)).await {
                tracing::warn!(table = %self.table_name, error = %e, "Failed to delete seed row");
            }
        }
        Ok(())
    }

    /// Drop every stored passage.
    pub async fn clear(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.contains(&self.table_name) {
            self.db.drop_table(&self.table_name, &[]).await?;
        }
        self.ensure_table().await?;
        tracing::info!(table = %self.table_name, "Cleared passage store");
        Ok(())
    }

    async fn dense_search(&self, query: &[f32], k: usize) -> Result<Vec<(String, String, f32)>> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let results = table
            .query()
            .nearest_to(query)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("LanceDB vector search failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        let mut hits = Vec::new();
        for batch in &batches {
            let ids = string_column(batch, "id");
            let texts = string_column(batch, "text");
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            let (Some(ids), Some(texts)) = (ids, texts) else {
                continue;
            };
            for i in 0..batch.num_rows() {
                if ids.value(i) == SEED_ID {
                    continue;
                }
                let score = distances.map(|d| 1.0 - d.value(i)).unwrap_or(0.0);
                hits.push((ids.value(i).to_string(), texts.value(i).to_string(), score));
            }
        }
        Ok(hits)
    }

    async fn sparse_search(&self, query: &SparseVector, k: usize) -> Result<Vec<(String, String, f32)>> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let results = table
            .query()
            .select(lancedb::query::Select::columns(&["id", "text", "sparse_json"]))
            .execute()
            .await
            .context("LanceDB passage scan failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        let mut hits = Vec::new();
        for batch in &batches {
            let (Some(ids), Some(texts), Some(sparse)) = (
                string_column(batch, "id"),
                string_column(batch, "text"),
                string_column(batch, "sparse_json"),
            ) else {
                continue;
            };
            for i in 0..batch.num_rows() {
                if ids.value(i) == SEED_ID {
                    continue;
                }
                let Ok(weights) = serde_json::from_str::<SparseVector>(sparse.value(i)) else {
                    tracing::warn!(id = %ids.value(i), "Skipping passage with unreadable sparse vector");
                    continue;
                };
                let score = weights.dot(query);
                if score > 0.0 {
                    hits.push((ids.value(i).to_string(), texts.value(i).to_string(), score));
                }
            }
        }

        hits.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

#[async_trait]
impl PassageStore for LanceStore {
    async fn insert(&self, passages: Vec<NewPassage>) -> Result<usize> {
        if passages.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = passages.iter().find(|p| p.embedding.dense.len() != self.dimension) {
            anyhow::bail!(
                "Dense vector has {} dimensions, store expects {}",
                bad.embedding.dense.len(),
                self.dimension
            );
        }

        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .context("Failed to open passages table")?;

        let len = passages.len();
        let now = chrono::Utc::now().timestamp();
        let mut ids = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut flat_vectors = Vec::with_capacity(len * self.dimension);
        let mut sparse_jsons = Vec::with_capacity(len);
        for passage in passages {
            ids.push(uuid::Uuid::new_v4().to_string());
            flat_vectors.extend_from_slice(&passage.embedding.dense);
            let pruned = passage.embedding.sparse.pruned(self.sparse_drop_ratio);
            sparse_jsons.push(serde_json::to_string(&pruned)?);
            texts.push(passage.text);
        }

        let batch = self.build_batch(ids, texts, flat_vectors, sparse_jsons, vec![now; len])?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)], self.schema());
        table
            .add(Box::new(reader))
            .execute()
            .await
            .context("Failed to insert passages")?;

        tracing::debug!("Inserted {} passages into LanceDB", len);
        Ok(len)
    }

    async fn hybrid_search(
        &self,
        query: &HybridEmbedding,
        params: &HybridSearchParams,
    ) -> Result<Vec<String>> {
        let (dense, sparse) = tokio::try_join!(
            self.dense_search(&query.dense, params.candidate_limit),
            self.sparse_search(&query.sparse, params.candidate_limit),
        )?;

        let mut texts: HashMap<String, String> = HashMap::new();
        let mut ranked = |hits: Vec<(String, String, f32)>| -> Vec<(String, f32)> {
            hits.into_iter()
                .map(|(id, text, score)| {
                    texts.insert(id.clone(), text);
                    (id, score)
                })
                .collect()
        };
        let dense = ranked(dense);
        let sparse = ranked(sparse);

        let fused = reciprocal_rank_fusion(&dense, &sparse, params.rrf_k, params.fusion_limit);
        tracing::debug!(
            dense = dense.len(),
            sparse = sparse.len(),
            fused = fused.len(),
            "Hybrid search complete"
        );
        Ok(fused
            .into_iter()
            .filter_map(|(id, _, _)| texts.remove(&id))
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count = table.count_rows(None).await?;
        Ok(count)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str, dense: Vec<f32>, terms: &[(u32, f32)]) -> NewPassage {
        NewPassage {
            text: text.to_string(),
            embedding: HybridEmbedding {
                dense,
                sparse: SparseVector {
                    indices: terms.iter().map(|(i, _)| *i).collect(),
                    values: terms.iter().map(|(_, v)| *v).collect(),
                },
            },
        }
    }

    #[tokio::test]
    async fn test_insert_search_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 3, 0.2).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        store
            .insert(vec![
                passage("attention is computed per head", vec![1.0, 0.0, 0.0], &[(10, 1.0)]),
                passage("the dataset has 12k pairs", vec![0.0, 1.0, 0.0], &[(20, 1.0)]),
                passage("results on the test split", vec![0.0, 0.0, 1.0], &[(30, 1.0)]),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 3);

        let query = HybridEmbedding {
            dense: vec![0.0, 1.0, 0.1],
            sparse: SparseVector { indices: vec![20], values: vec![1.0] },
        };
        let hits = store.hybrid_search(&query, &HybridSearchParams::default()).await.unwrap();
        assert_eq!(hits[0], "the dataset has 12k pairs");
        assert!(hits.len() <= 3);

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 3, 0.2).await.unwrap();
        let result = store.insert(vec![passage("short", vec![1.0], &[])]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_seed_row_never_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        LanceStore::open(dir.path(), 3, 0.2).await.unwrap();
        let store = LanceStore::open(dir.path(), 3, 0.2).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        store
            .insert(vec![passage("the only passage", vec![1.0, 0.0, 0.0], &[(7, 1.0)])])
            .await
            .unwrap();
        let query = HybridEmbedding {
            dense: vec![0.0, 0.0, 1.0],
            sparse: SparseVector { indices: vec![7], values: vec![1.0] },
        };
        let hits = store.hybrid_search(&query, &HybridSearchParams::default()).await.unwrap();
        assert_eq!(hits, vec!["the only passage".to_string()]);
    }
}
