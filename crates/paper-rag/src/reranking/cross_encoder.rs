use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::Reranker;
use crate::types::RankedPassage;

/// Cross-encoder reranker (bge-reranker-v2-m3 or any BERT-style pair classifier)
pub struct CrossEncoderReranker {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    max_length: usize,
    uses_type_ids: bool,
}

impl CrossEncoderReranker {
    pub fn new(model_dir: &Path, max_length: usize) -> Result<Self> {
        let model_path = Self::find_model(model_dir)?;
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !tokenizer_path.exists() {
            return Err(anyhow!(
                "Tokenizer not found at: {}",
                tokenizer_path.display()
            ));
        }

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {:?}", e))?;

        let model_bytes = std::fs::read(&model_path)?;
        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Opt level: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load reranker model: {:?}", e))?;

        // XLM-R based rerankers take no segment ids
        let uses_type_ids = session.inputs.iter().any(|input| input.name == "token_type_ids");

        tracing::info!(model = %model_path.display(), uses_type_ids, "Loaded cross-encoder reranker");
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            max_length,
            uses_type_ids,
        })
    }

    fn find_model(model_dir: &Path) -> Result<PathBuf> {
        let candidates = [
            model_dir.join("model_O4.onnx"),
            model_dir.join("model.onnx"),
        ];
        for path in &candidates {
            if path.exists() {
                return Ok(path.clone());
            }
        }
        Err(anyhow!(
            "No reranker model found in: {}",
            model_dir.display()
        ))
    }

    /// Score a batch of documents against one query. One logit per document.
    fn score_batch(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        let encodings = documents
            .iter()
            .map(|doc| {
                self.tokenizer
                    .encode((query, doc.as_str()), true)
                    .map_err(|e| anyhow!("Tokenization failed: {:?}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(self.max_length))
            .max()
            .unwrap_or(1)
            .max(1);
        let batch_size = encodings.len();

        let mut ids_flat = Vec::with_capacity(batch_size * max_len);
        let mut mask_flat = Vec::with_capacity(batch_size * max_len);
        let mut type_flat = Vec::with_capacity(batch_size * max_len);

        for enc in &encodings {
            let len = enc.get_ids().len().min(max_len);
            for i in 0..len {
                ids_flat.push(enc.get_ids()[i] as i64);
                mask_flat.push(enc.get_attention_mask()[i] as i64);
                type_flat.push(enc.get_type_ids()[i] as i64);
            }
            // Pad to max_len
            for _ in len..max_len {
                ids_flat.push(0i64);
                mask_flat.push(0i64);
                type_flat.push(0i64);
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids = Value::from_array((shape.clone(), ids_flat))
            .map_err(|e| anyhow!("batch input_ids: {:?}", e))?;
        let attention_mask = Value::from_array((shape.clone(), mask_flat))
            .map_err(|e| anyhow!("batch attention_mask: {:?}", e))?;

        let mut session = self.session.lock();
        let result = if self.uses_type_ids {
            let token_type_ids = Value::from_array((shape, type_flat))
                .map_err(|e| anyhow!("batch token_type_ids: {:?}", e))?;
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ])
        };
        let outputs = result.map_err(|e| anyhow!("Batch reranker inference failed: {:?}", e))?;

        // logits shape: [batch_size, 1]
        let output_key = outputs
            .iter()
            .next()
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| "logits".to_string());
        let (_shape, data) = outputs[output_key.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract batch logits: {:?}", e))?;

        if data.len() != batch_size {
            return Err(anyhow!(
                "Cross-encoder returned {} scores for {} documents",
                data.len(),
                batch_size
            ));
        }
        Ok(data.to_vec())
    }
}

impl Reranker for CrossEncoderReranker {
    fn rerank(&self, query: &str, documents: &[String], top_k: usize) -> Result<Vec<RankedPassage>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        const MAX_BATCH: usize = 16;
        let mut scores = Vec::with_capacity(documents.len());
        for chunk in documents.chunks(MAX_BATCH) {
            scores.extend(self.score_batch(query, chunk)?);
        }

        Ok(super::top_k_by_score(documents, &scores, top_k))
    }
}
