use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionOutputs};
use ort::value::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::EmbeddingModel;
use crate::config::EmbeddingConfig;
use crate::types::{HybridEmbedding, SparseVector};

pub const BGE_M3_DIMENSION: usize = 1024;

#[derive(Clone, Debug)]
pub struct BgeM3Config {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub max_length: usize,
    pub batch_size: usize,
    pub cache_size: usize,
}

impl BgeM3Config {
    pub fn from_model_dir(model_dir: &Path, config: &EmbeddingConfig) -> Result<Self> {
        let model_path = [model_dir.join("model.onnx"), model_dir.join("bge_m3.onnx")]
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| anyhow!("No BGE-M3 ONNX model found in: {}", model_dir.display()))?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(anyhow!("Tokenizer not found at: {}", tokenizer_path.display()));
        }

        Ok(Self {
            model_path,
            tokenizer_path,
            max_length: config.max_length,
            batch_size: config.batch_size.max(1),
            cache_size: config.cache_size,
        })
    }
}

/// BGE-M3 producing a normalized dense vector and lexical sparse weights
/// from a single forward pass.
pub struct BgeM3Embeddings {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    config: BgeM3Config,
    cache: Arc<RwLock<lru::LruCache<String, HybridEmbedding>>>,
}

impl BgeM3Embeddings {
    pub fn new(config: BgeM3Config) -> Result<Self> {
        ort::init().with_name("bge_m3_embeddings").commit();

        let tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {:?}", e))?;

        let model_bytes = std::fs::read(&config.model_path)
            .map_err(|e| anyhow!("Failed to read model: {:?}", e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        let cache_size = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);

        tracing::info!(model = %config.model_path.display(), "Loaded BGE-M3 embedding model");
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            config,
            cache: Arc::new(RwLock::new(lru::LruCache::new(cache_size))),
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<HybridEmbedding>> {
        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(*text, true)
                    .map_err(|e| anyhow!("Tokenization failed: {:?}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(self.config.max_length))
            .max()
            .unwrap_or(1)
            .max(1);
        let batch_size = encodings.len();

        let mut ids_flat = Vec::with_capacity(batch_size * max_len);
        let mut mask_flat = Vec::with_capacity(batch_size * max_len);
        for enc in &encodings {
            let len = enc.get_ids().len().min(max_len);
            for i in 0..len {
                ids_flat.push(enc.get_ids()[i] as i64);
                mask_flat.push(enc.get_attention_mask()[i] as i64);
            }
            // Pad to max_len
            for _ in len..max_len {
                ids_flat.push(1i64);
                mask_flat.push(0i64);
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids = Value::from_array((shape.clone(), ids_flat))
            .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
        let attention_mask = Value::from_array((shape, mask_flat))
            .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;

        let inputs = ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
        ];

        let mut session = self.session.lock();
        let outputs = session
            .run(inputs)
            .map_err(|e| anyhow!("Inference failed: {:?}", e))?;

        let dense = extract_dense(&outputs, batch_size)?;
        let sparse_weights = extract_token_weights(&outputs, batch_size, max_len)?;

        Ok(encodings
            .iter()
            .zip(dense)
            .zip(sparse_weights)
            .map(|((enc, dense), weights)| {
                let len = enc.get_ids().len().min(max_len);
                HybridEmbedding {
                    dense,
                    sparse: sparse_from_token_weights(
                        &enc.get_ids()[..len],
                        &weights[..len],
                        &enc.get_special_tokens_mask()[..len],
                    ),
                }
            })
            .collect())
    }
}

impl EmbeddingModel for BgeM3Embeddings {
    fn embed_query(&self, text: &str) -> Result<HybridEmbedding> {
        if let Some(cached) = self.cache.write().get(text) {
            return Ok(cached.clone());
        }

        let embedding = self
            .embed_batch(&[text])?
            .pop()
            .ok_or_else(|| anyhow!("Model returned no embedding"))?;

        self.cache.write().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<HybridEmbedding>> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            all.extend(self.embed_batch(batch)?);
        }
        Ok(all)
    }

    fn dimension(&self) -> usize {
        BGE_M3_DIMENSION
    }
}

/// Dense vectors from `dense_vecs`, or the CLS token of `last_hidden_state`.
fn extract_dense(outputs: &SessionOutputs, batch_size: usize) -> Result<Vec<Vec<f32>>> {
    let has_dense = outputs.iter().any(|(name, _)| name == "dense_vecs");

    if has_dense {
        let (shape, data) = outputs["dense_vecs"]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract dense_vecs: {:?}", e))?;
        let dim = shape[1] as usize;
        return Ok((0..batch_size)
            .map(|b| l2_normalize(data[b * dim..(b + 1) * dim].to_vec()))
            .collect());
    }

    let (shape, data) = outputs["last_hidden_state"]
        .try_extract_tensor::<f32>()
        .map_err(|e| anyhow!("Failed to extract last_hidden_state: {:?}", e))?;
    let seq_len = shape[1] as usize;
    let dim = shape[2] as usize;
    Ok((0..batch_size)
        .map(|b| {
            let offset = b * seq_len * dim;
            l2_normalize(data[offset..offset + dim].to_vec())
        })
        .collect())
}

/// Per-token lexical weights from `sparse_vecs` ([batch, seq, 1]).
fn extract_token_weights(
    outputs: &SessionOutputs,
    batch_size: usize,
    seq_len: usize,
) -> Result<Vec<Vec<f32>>> {
    let (_shape, data) = outputs["sparse_vecs"]
        .try_extract_tensor::<f32>()
        .map_err(|e| anyhow!("Failed to extract sparse_vecs: {:?}", e))?;
    if data.len() < batch_size * seq_len {
        return Err(anyhow!(
            "sparse_vecs has {} values, expected {}",
            data.len(),
            batch_size * seq_len
        ));
    }
    Ok((0..batch_size)
        .map(|b| data[b * seq_len..(b + 1) * seq_len].to_vec())
        .collect())
}

/// Collapse token weights into a sparse vector: ReLU, special tokens
/// dropped, max weight kept for repeated ids.
pub(crate) fn sparse_from_token_weights(ids: &[u32], weights: &[f32], special_mask: &[u32]) -> SparseVector {
    let mut by_token: HashMap<u32, f32> = HashMap::new();
    for ((&id, &weight), &special) in ids.iter().zip(weights).zip(special_mask) {
        if special == 1 {
            continue;
        }
        let weight = weight.max(0.0);
        let entry = by_token.entry(id).or_insert(0.0);
        if weight > *entry {
            *entry = weight;
        }
    }
    SparseVector::from_map(by_token)
}

fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_weights_max_per_token() {
        // <s> attention is attention </s>
        let ids = [0, 42, 7, 42, 2];
        let weights = [0.9, 0.2, -0.3, 0.5, 0.8];
        let special = [1, 0, 0, 0, 1];
        let sparse = sparse_from_token_weights(&ids, &weights, &special);
        assert_eq!(sparse.indices, vec![42]);
        assert_eq!(sparse.values, vec![0.5]);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_config_requires_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::RagConfig::default();
        assert!(BgeM3Config::from_model_dir(dir.path(), &config.embedding).is_err());
    }
}
