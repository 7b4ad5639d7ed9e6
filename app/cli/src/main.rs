use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use paper_rag::embeddings::{BgeM3Config, BgeM3Embeddings, EmbeddingModel};
use paper_rag::llm::ExternalProvider;
use paper_rag::reranking::{CrossEncoderReranker, Reranker};
use paper_rag::storage::{LanceStore, PassageStore};
use paper_rag::{ConversationPipeline, DocumentIndexer, RagConfig, SessionStore};

/// Index a research paper and ask questions about it.
#[derive(Parser, Debug)]
#[command(name = "paper-rag", version)]
struct Args {
    /// PDF of the paper to chat with
    pdf: PathBuf,

    /// JSON config file; missing fields use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep passages indexed by earlier runs instead of starting clean
    #[arg(long)]
    keep_index: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<RagConfig> {
    let config = match path {
        Some(path) => RagConfig::from_file(path).map_err(anyhow::Error::msg)?,
        None => RagConfig::default(),
    }
    .with_env_overrides();
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    let embedding_config = BgeM3Config::from_model_dir(&config.embedding.model_dir, &config.embedding)?;
    let embedder: Arc<dyn EmbeddingModel> =
        Arc::new(BgeM3Embeddings::new(embedding_config).context("Failed to load embedding model")?);
    let reranker: Arc<dyn Reranker> = Arc::new(
        CrossEncoderReranker::new(&config.reranker.model_dir, config.reranker.max_length)
            .context("Failed to load reranker")?,
    );

    let lance = LanceStore::open(
        &config.data_dir.join("lancedb"),
        embedder.dimension(),
        config.search.sparse_drop_ratio,
    )
    .await?;
    if !args.keep_index {
        lance.clear().await?;
    }
    let store: Arc<dyn PassageStore> = Arc::new(lance);

    let indexer = DocumentIndexer::new(&config, Arc::clone(&embedder), Arc::clone(&store));
    let indexed = indexer.index_file(&args.pdf).await?;
    tracing::info!("Indexed {} passages from {}", indexed, args.pdf.display());

    let llm = Arc::new(ExternalProvider::new(&config.llm)?);
    let sessions = Arc::new(SessionStore::new());
    let pipeline = ConversationPipeline::new(config, embedder, store, reranker, llm, Arc::clone(&sessions));
    let session_id = SessionStore::new_session_id();

    println!("Ask about the paper. /reset clears the conversation, /quit exits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                sessions.reset(&session_id).await;
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        match pipeline.process_turn(&session_id, line).await {
            Ok(outcome) => println!("\n{}\n", outcome.answer),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}
