use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hazel_ai_embed::{EmbeddingProvider, FallbackEmbedder, FastEmbedEmbedder, OllamaEmbedder};
use hazel_ai_index::config::IndexConfig;
use hazel_ai_index::retrieval::{Indexer, Retriever, start_watching};
use hazel_ai_store::{QdrantStore, VectorStore};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Semantic file indexing and retrieval")]
struct Args {
    /// Root directory to index
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// TOML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Qdrant server URL
    #[arg(long, default_value = "http://localhost:6334")]
    qdrant_url: String,

    /// Ollama server URL
    #[arg(long, default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Ollama embedding model
    #[arg(long, default_value = "nomic-embed-text")]
    ollama_model: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-index every eligible file under the root
    Rebuild,
    /// Rebuild, then keep the index current until interrupted
    Watch,
    /// Search the index and print matching snippets as JSON
    Query {
        query: String,
        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Remove a file or directory from the index
    Remove { path: PathBuf },
    /// Print index statistics
    Stats,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::default(),
    };

    let embedder = build_embedder(&args, &config)?;
    let store: Arc<dyn VectorStore> =
        Arc::new(QdrantStore::new(&args.qdrant_url).context("connecting to qdrant")?);
    let indexer = Arc::new(Indexer::new(
        &args.root,
        config.clone(),
        embedder.clone(),
        store.clone(),
    )?);

    match args.command {
        Command::Rebuild => {
            let summary = indexer.rebuild_all().await?;
            println!(
                "Indexed {} files ({} chunks, {} failed) in {:.1}s",
                summary.files_processed,
                summary.chunks_indexed,
                summary.files_failed,
                summary.duration.as_secs_f64()
            );
        }
        Command::Watch => {
            let summary = indexer.rebuild_all().await?;
            info!(
                files = summary.files_processed,
                chunks = summary.chunks_indexed,
                "initial rebuild done, watching"
            );
            let handle = start_watching(indexer.clone(), &config).await?;
            tokio::signal::ctrl_c()
                .await
                .context("waiting for ctrl-c")?;
            info!("shutting down");
            handle.stop().await;
        }
        Command::Query { query, top_k } => {
            let retriever = Retriever::new(indexer.root(), embedder, store);
            let results = retriever
                .retrieve(&query, top_k.unwrap_or(config.top_k_default))
                .await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Remove { path } => {
            let removed = indexer.remove_tree(&path).await?;
            println!("Removed {removed} file(s) from the index");
        }
        Command::Stats => {
            println!("{} points indexed", store.point_count().await?);
        }
    }
    Ok(())
}

/// Ollama first, in-process fastembed as fallback. The fastembed model is
/// only added when the configured dimension matches its output width, so
/// the chain never mixes vector spaces.
fn build_embedder(args: &Args, config: &IndexConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let ollama = OllamaEmbedder::new(
        &args.ollama_url,
        &args.ollama_model,
        config.embedding_dimension,
        config.op_timeout(),
    )?;

    let mut providers: Vec<Arc<dyn EmbeddingProvider>> = vec![Arc::new(ollama)];
    match FastEmbedEmbedder::nomic_default() {
        Ok(fastembed) if fastembed.dimension() == config.embedding_dimension => {
            providers.push(Arc::new(fastembed));
        }
        Ok(_) => info!("fastembed fallback disabled, dimension differs from configuration"),
        Err(e) => info!(error = %e, "fastembed fallback unavailable"),
    }

    Ok(Arc::new(FallbackEmbedder::new(providers)?))
}
