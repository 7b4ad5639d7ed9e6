use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::{ApiProvider, LLMConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub conversation: ConversationConfig,
    pub llm: LLMConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_dir: PathBuf,
    pub max_length: usize,
    pub batch_size: usize,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub model_dir: PathBuf,
    pub max_length: usize,
    /// Passages kept per query after cross-encoder scoring.
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Per-branch candidate cap for the dense and sparse searches.
    pub candidate_limit: usize,
    /// Cap on the fused candidate list handed to the reranker.
    pub fusion_limit: usize,
    pub rrf_k: usize,
    /// Fraction of the smallest sparse weights pruned from each passage at insert.
    pub sparse_drop_ratio: f32,
    /// Retrieve the rewritten/decomposed queries concurrently.
    pub parallel_queries: bool,
    pub collaborator_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Summarize once the history grows past this many messages.
    pub max_messages: usize,
    /// Most recent messages kept verbatim after summarization.
    pub retained_messages: usize,
    /// Below this history length a "no-retrieve" verdict still retrieves.
    pub context_history_threshold: usize,
    pub max_rewrites: usize,
    pub answer_language: String,
}

impl SearchConfig {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }
}

impl RagConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.max_length == 0 {
            return Err("embedding.max_length must be > 0".into());
        }
        if self.embedding.batch_size == 0 {
            return Err("embedding.batch_size must be > 0".into());
        }
        if self.reranker.top_k == 0 {
            return Err("reranker.top_k must be > 0".into());
        }
        if self.chunking.chunk_size < 50 {
            return Err("chunking.chunk_size must be >= 50".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err("chunking.chunk_overlap must be < chunk_size".into());
        }
        if self.search.candidate_limit == 0 || self.search.fusion_limit == 0 {
            return Err("search limits must be > 0".into());
        }
        if self.search.fusion_limit > 2 * self.search.candidate_limit {
            return Err("search.fusion_limit cannot exceed both candidate lists combined".into());
        }
        if !(0.0..1.0).contains(&self.search.sparse_drop_ratio) {
            return Err("search.sparse_drop_ratio must be in [0.0, 1.0)".into());
        }
        if self.search.collaborator_timeout_secs == 0 {
            return Err("search.collaborator_timeout_secs must be > 0".into());
        }
        if self.conversation.retained_messages < 1 {
            return Err("conversation.retained_messages must be >= 1".into());
        }
        if self.conversation.retained_messages >= self.conversation.max_messages {
            return Err("conversation.retained_messages must be < max_messages".into());
        }
        if self.conversation.max_rewrites == 0 {
            return Err("conversation.max_rewrites must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Pull secrets and model locations from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        let key_var = match self.llm.provider {
            ApiProvider::Google => "GEMINI_API_KEY",
            ApiProvider::OpenAI => "OPENAI_API_KEY",
            ApiProvider::Anthropic => "ANTHROPIC_API_KEY",
            ApiProvider::Ollama | ApiProvider::Custom { .. } => "LLM_API_KEY",
        };
        if let Ok(key) = std::env::var(key_var).or_else(|_| std::env::var("LLM_API_KEY")) {
            self.llm.api_key = key;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(model_path) = std::env::var("MODEL_PATH") {
            let root = PathBuf::from(model_path);
            self.embedding.model_dir = root.join("bge-m3");
            self.reranker.model_dir = root.join("bge-reranker-v2-m3");
        }
        self
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("paper-rag")
}

/// `./models` when present, otherwise under the data directory.
fn default_model_root() -> PathBuf {
    if Path::new("models").exists() {
        PathBuf::from("models")
    } else {
        default_data_dir().join("models")
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            conversation: ConversationConfig::default(),
            llm: LLMConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_root().join("bge-m3"),
            max_length: 512,
            batch_size: 8,
            cache_size: 1000,
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_root().join("bge-reranker-v2-m3"),
            max_length: 512,
            top_k: 5,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            min_chunk_size: 100,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 10,
            fusion_limit: 10,
            rrf_k: 60,
            sparse_drop_ratio: 0.2,
            parallel_queries: true,
            collaborator_timeout_secs: 60,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_messages: 6,
            retained_messages: 2,
            context_history_threshold: 3,
            max_rewrites: 3,
            answer_language: "Vietnamese".to_string(),
        }
    }
}
