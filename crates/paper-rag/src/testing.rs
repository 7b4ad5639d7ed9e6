//! Deterministic collaborators for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingModel;
use crate::llm::{ChatMessage, ChatRole, GenerationConfig, LLMConfig, LLMProvider, ProviderInfo};
use crate::pipeline::ConversationPipeline;
use crate::rag::ChatClient;
use crate::reranking::{top_k_by_score, Reranker};
use crate::session::SessionStore;
use crate::storage::{MemoryStore, PassageStore};
use crate::types::{HybridEmbedding, Message, NewPassage, RankedPassage, SparseVector};

pub(crate) const PAPER_TEXT: &str = "# **Abstract**\n\
We introduce a question answering dataset built from Vietnamese research papers. \
The dataset contains twelve thousand question-answer pairs written by trained annotators. \
We evaluate several retrieval augmented generation baselines on the dataset.\n\n\
# **1 Introduction**\n\
Question answering over scientific documents requires models to locate evidence in long texts. \
Existing datasets focus on English papers, which leaves other languages without benchmarks. \
In this paper we describe the collection process and report baseline results.\n\n\
# **2 Dataset Construction**\n\
Annotators read each paper and wrote questions about methods, results, and datasets. \
Every pair was checked by a second annotator, and disagreements were resolved by discussion. \
Annotation quality was measured with inter-annotator agreement, reaching a kappa of 0.81.\n\n\
# **3 Experiments**\n\
We compare dense retrieval, sparse retrieval, and hybrid retrieval with reranking. \
Hybrid retrieval with a cross-encoder reranker gives the best exact match and F1 scores. \
Generation quality is reported with BLEU and ROUGE-L on the test split.\n";

const PASSAGES: &[&str] = &[
    "The dataset introduced in this paper contains twelve thousand question-answer pairs collected from research papers.",
    "Annotation quality in this paper is evaluated with inter-annotator agreement, reaching a kappa of 0.81.",
    "The main contribution of this paper is a benchmark for question answering over Vietnamese scientific documents.",
    "The model architecture combines a hybrid retriever with a cross-encoder reranker and a generator.",
    "Experiments report exact match, F1, BLEU and ROUGE-L metrics on the test split of the dataset.",
    "Baselines compared in this paper include dense retrieval, sparse retrieval and hybrid retrieval.",
];

const FAKE_DIMENSION: usize = 16;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn word_hash(word: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    word.hash(&mut hasher);
    hasher.finish()
}

/// Bag-of-words embedder: hashed buckets for the dense part, hashed word
/// ids for the sparse part.
#[derive(Default)]
pub(crate) struct FakeEmbedder {
    fail: bool,
}

impl FakeEmbedder {
    pub fn failing() -> Self {
        Self { fail: true }
    }

    fn embed(&self, text: &str) -> Result<HybridEmbedding> {
        if self.fail {
            return Err(anyhow!("embedding model unavailable"));
        }
        let mut dense = vec![0.0f32; FAKE_DIMENSION];
        let mut weights: HashMap<u32, f32> = HashMap::new();
        for word in words(text) {
            let hash = word_hash(&word);
            dense[(hash % FAKE_DIMENSION as u64) as usize] += 1.0;
            *weights.entry((hash % 50_000) as u32).or_insert(0.0) += 1.0;
        }
        let norm = dense.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            dense.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(HybridEmbedding {
            dense,
            sparse: SparseVector::from_map(weights),
        })
    }
}

impl EmbeddingModel for FakeEmbedder {
    fn embed_query(&self, text: &str) -> Result<HybridEmbedding> {
        self.embed(text)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<HybridEmbedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        FAKE_DIMENSION
    }
}

/// Scores by the number of query words found in the passage.
#[derive(Default)]
pub(crate) struct FakeReranker {
    fail: bool,
}

impl FakeReranker {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Reranker for FakeReranker {
    fn rerank(&self, query: &str, documents: &[String], top_k: usize) -> Result<Vec<RankedPassage>> {
        if self.fail {
            return Err(anyhow!("reranker unavailable"));
        }
        let query_words: Vec<String> = words(query).collect();
        let scores: Vec<f32> = documents
            .iter()
            .map(|doc| {
                let doc_words: Vec<String> = words(doc).collect();
                query_words.iter().filter(|w| doc_words.contains(w)).count() as f32
            })
            .collect();
        Ok(top_k_by_score(documents, &scores, top_k))
    }
}

pub(crate) async fn seeded_store(embedder: &FakeEmbedder) -> Arc<dyn PassageStore> {
    let store = MemoryStore::default();
    let embeddings = embedder.embed_documents(PASSAGES).unwrap();
    let passages = PASSAGES
        .iter()
        .zip(embeddings)
        .map(|(text, embedding)| NewPassage {
            text: text.to_string(),
            embedding,
        })
        .collect();
    store.insert(passages).await.unwrap();
    Arc::new(store)
}

/// Language-model call kinds, told apart by their prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Classify,
    Rewrite,
    Decompose,
    Generate,
    Summarize,
}

impl Step {
    fn detect(messages: &[ChatMessage]) -> Self {
        let first = messages.first();
        if first.is_some_and(|m| m.role == ChatRole::System && m.content.contains("helping answer questions")) {
            return Step::Generate;
        }
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        if last.contains("classifying user queries") {
            Step::Classify
        } else if last.contains("reformulating user queries") {
            Step::Rewrite
        } else if last.contains("breaking down complex queries") {
            Step::Decompose
        } else {
            Step::Summarize
        }
    }
}

struct Script {
    class: String,
    rewrites: Vec<String>,
    decomposition: Vec<String>,
    answer: String,
    summary: String,
    fail_at: Option<Step>,
    json_output: bool,
    calls: Vec<Call>,
}

struct Call {
    step: Step,
    messages: Vec<ChatMessage>,
    json: bool,
}

/// Canned replies per step. Clones share the script and call log.
#[derive(Clone)]
pub(crate) struct ScriptedLlm {
    script: Arc<Mutex<Script>>,
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                class: "simple".to_string(),
                rewrites: owned(&[
                    "What is the main contribution of this paper?",
                    "Which dataset is introduced in this paper?",
                ]),
                decomposition: owned(&[
                    "What dataset is introduced in this paper?",
                    "Which metrics are reported in this paper?",
                ]),
                answer: "**1. Answer**\n- The dataset contains twelve thousand pairs.".to_string(),
                summary: "The user asked about the dataset.".to_string(),
                fail_at: None,
                json_output: true,
                calls: Vec::new(),
            })),
        }
    }

    pub fn with_class(self, class: &str) -> Self {
        self.set_class(class);
        self
    }

    pub fn with_rewrites(self, lines: &[&str]) -> Self {
        self.script.lock().rewrites = owned(lines);
        self
    }

    pub fn with_decomposition(self, lines: &[&str]) -> Self {
        self.script.lock().decomposition = owned(lines);
        self
    }

    pub fn with_answer(self, answer: &str) -> Self {
        self.script.lock().answer = answer.to_string();
        self
    }

    pub fn with_summary(self, summary: &str) -> Self {
        self.script.lock().summary = summary.to_string();
        self
    }

    /// Report a provider without a JSON response mode.
    pub fn without_json_output(self) -> Self {
        self.script.lock().json_output = false;
        self
    }

    pub fn set_class(&self, class: &str) {
        self.script.lock().class = class.to_string();
    }

    pub fn fail_at(&self, step: Step) {
        self.script.lock().fail_at = Some(step);
    }

    pub fn calls_of(&self, step: Step) -> usize {
        self.script.lock().calls.iter().filter(|c| c.step == step).count()
    }

    /// Whether each call so far asked for JSON output, in call order.
    pub fn json_requests(&self) -> Vec<bool> {
        self.script.lock().calls.iter().map(|c| c.json).collect()
    }

    /// First message (the system prompt, for generation) of the latest
    /// call of `step`.
    pub fn first_message_of(&self, step: Step) -> Option<String> {
        let script = self.script.lock();
        script
            .calls
            .iter()
            .rev()
            .find(|c| c.step == step)
            .and_then(|c| c.messages.first())
            .map(|m| m.content.clone())
    }

    /// Content of the final message of the most recent call.
    pub fn last_prompt(&self) -> Option<String> {
        let script = self.script.lock();
        script
            .calls
            .last()
            .and_then(|c| c.messages.last())
            .map(|m| m.content.clone())
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn chat(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<String> {
        let step = Step::detect(messages);
        let mut script = self.script.lock();
        script.calls.push(Call {
            step,
            messages: messages.to_vec(),
            json: config.json_output,
        });
        if script.fail_at == Some(step) {
            return Err(anyhow!("scripted failure at {:?}", step));
        }
        Ok(match step {
            Step::Classify => format!("{{\"class\": \"{}\"}}", script.class),
            Step::Rewrite => script.rewrites.join("\n"),
            Step::Decompose => script.decomposition.join("\n"),
            Step::Generate => script.answer.clone(),
            Step::Summarize => script.summary.clone(),
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "scripted".to_string(),
            model: "scripted".to_string(),
            supports_json_output: self.script.lock().json_output,
        }
    }
}

pub(crate) fn chat_client(llm: ScriptedLlm) -> ChatClient {
    ChatClient::new(Arc::new(llm), &LLMConfig::default())
}

/// `n` alternating user/assistant messages with distinct content.
pub(crate) fn history(n: usize) -> Vec<Message> {
    (0..n)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("question {}", i))
            } else {
                Message::assistant(format!("answer {}", i))
            }
        })
        .collect()
}

pub(crate) async fn pipeline_with(llm: ScriptedLlm) -> ConversationPipeline {
    let store = seeded_store(&FakeEmbedder::default()).await;
    pipeline_over(llm, store)
}

pub(crate) fn pipeline_over(llm: ScriptedLlm, store: Arc<dyn PassageStore>) -> ConversationPipeline {
    ConversationPipeline::new(
        RagConfig::default(),
        Arc::new(FakeEmbedder::default()),
        store,
        Arc::new(FakeReranker::default()),
        Arc::new(llm),
        Arc::new(SessionStore::new()),
    )
}
