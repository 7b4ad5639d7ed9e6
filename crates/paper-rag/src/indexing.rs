//! Paper ingestion: extract, clean, chunk, embed, store.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingModel;
use crate::processing::{extract_pdf_file, extract_pdf_text, prepare_document, RecursiveChunker};
use crate::storage::PassageStore;
use crate::types::NewPassage;

pub struct DocumentIndexer {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn PassageStore>,
    chunker: RecursiveChunker,
    batch_size: usize,
}

impl DocumentIndexer {
    pub fn new(config: &RagConfig, embedder: Arc<dyn EmbeddingModel>, store: Arc<dyn PassageStore>) -> Self {
        Self {
            embedder,
            store,
            chunker: RecursiveChunker::from_config(&config.chunking),
            batch_size: config.embedding.batch_size.max(1),
        }
    }

    /// Index an in-memory PDF. Returns the number of passages stored.
    pub async fn index_pdf(&self, bytes: Vec<u8>) -> Result<usize> {
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(|e| anyhow!("PDF extraction task failed: {}", e))??;
        self.index_text(&text).await
    }

    pub async fn index_file(&self, path: &Path) -> Result<usize> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract_pdf_file(&owned))
            .await
            .map_err(|e| anyhow!("PDF extraction task failed: {}", e))??;
        self.index_text(&text)
            .await
            .with_context(|| format!("Failed to index {}", path.display()))
    }

    /// Chunk and index already-extracted paper text.
    pub async fn index_text(&self, text: &str) -> Result<usize> {
        let start = Instant::now();
        let chunks = self.chunker.chunk(&prepare_document(text));
        if chunks.is_empty() {
            return Err(anyhow!("Document has no extractable text"));
        }

        let mut stored = 0;
        for batch in chunks.chunks(self.batch_size) {
            let embedder = Arc::clone(&self.embedder);
            let texts = batch.to_vec();
            let embeddings = tokio::task::spawn_blocking(move || {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                embedder.embed_documents(&refs)
            })
            .await
            .map_err(|e| anyhow!("Embedding task failed: {}", e))??;

            if embeddings.len() != batch.len() {
                return Err(anyhow!(
                    "Embedding model returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                ));
            }

            let passages = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(text, embedding)| NewPassage { text, embedding })
                .collect();
            stored += self.store.insert(passages).await?;
        }

        tracing::info!(
            chunks = chunks.len(),
            stored = stored,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Indexed document"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::{FakeEmbedder, PAPER_TEXT};

    #[tokio::test]
    async fn test_index_text_stores_chunks() {
        let mut config = RagConfig::default();
        config.chunking.chunk_size = 200;
        config.chunking.chunk_overlap = 20;
        config.chunking.min_chunk_size = 30;
        config.embedding.batch_size = 2;

        let store = Arc::new(MemoryStore::default());
        let indexer = DocumentIndexer::new(&config, Arc::new(FakeEmbedder::default()), store.clone());
        let stored = indexer.index_text(PAPER_TEXT).await.unwrap();

        assert!(stored > 1);
        assert_eq!(store.count().await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_references_not_indexed() {
        let store = Arc::new(MemoryStore::default());
        let indexer = DocumentIndexer::new(&RagConfig::default(), Arc::new(FakeEmbedder::default()), store.clone());
        let text = format!("{}\nReferences\n[1] Someone. A cited work. 2019.", PAPER_TEXT);
        indexer.index_text(&text).await.unwrap();

        let query = FakeEmbedder::default().embed_query("cited work Someone").unwrap();
        let hits = store
            .hybrid_search(&query, &crate::search::HybridSearchParams::default())
            .await
            .unwrap();
        assert!(hits.iter().all(|h| !h.contains("A cited work")));
    }

    #[tokio::test]
    async fn test_empty_document_is_error() {
        let indexer = DocumentIndexer::new(
            &RagConfig::default(),
            Arc::new(FakeEmbedder::default()),
            Arc::new(MemoryStore::default()),
        );
        assert!(indexer.index_text("  short  ").await.is_err());
    }
}
