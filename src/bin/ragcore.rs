use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ragcore_lib::config::{self, AppConfig};
use ragcore_lib::llm::registry::ProviderRegistry;
use ragcore_lib::rag::builder::CorpusBuilder;
use ragcore_lib::rag::corpus::Corpus;
use ragcore_lib::rag::retriever::{retrieve_within, RetrievedPassage};

#[derive(Parser)]
#[command(name = "ragcore", about = "Build a vector corpus and answer questions over it", version)]
struct Cli {
    /// Path to config.toml (default: next to the executable, then the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Embed every chunk of a source file and replace the persisted corpus
    Build {
        /// JSON array of strings, or plain text with one chunk per line
        #[arg(long)]
        source: PathBuf,
    },

    /// Show the passages nearest to a query
    Query {
        query: String,
        /// Number of passages (default: retrieval.top_k)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Answer a question from retrieved context
    Ask { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    ragcore_lib::init_tracing("info");

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    }
    .context("loading configuration")?;

    match cli.command {
        Command::Build { source } => build(&cfg, &source).await,
        Command::Query { query, k } => {
            let embedder = ProviderRegistry::from_config(&cfg).embedder()?;
            let corpus = Corpus::load(&cfg.corpus.paths(), cfg.corpus.metric)?;
            let k = k.unwrap_or(cfg.retrieval.top_k);
            let passages = retrieve_within(
                cfg.retrieval.request_timeout(),
                &query,
                k,
                embedder.as_ref(),
                &corpus,
            )
            .await?;
            print_passages(&query, &passages, &cli.format)
        }
        Command::Ask { query } => {
            let pipeline = ragcore_lib::pipeline_from_config(&cfg)?;
            let answer = pipeline.answer(&query).await?;
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "query": query,
                        "answer": answer,
                    }))?
                ),
                OutputFormat::Plain => println!("{answer}"),
            }
            Ok(())
        }
    }
}

async fn build(cfg: &AppConfig, source: &Path) -> Result<()> {
    let chunks = read_chunks(source)?;
    let embedder = ProviderRegistry::from_config(cfg).embedder()?;
    let builder = CorpusBuilder::from_config(cfg);
    let corpus = builder.build(chunks.as_slice(), embedder.as_ref()).await?;
    println!(
        "Built corpus: {} chunks, dimension {} -> {}, {}",
        corpus.count(),
        corpus.dimension(),
        builder.paths().index_path.display(),
        builder.paths().store_path.display(),
    );
    Ok(())
}

/// A `.json` source is an array of strings; anything else is one chunk per non-blank line.
fn read_chunks(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading corpus source {}", path.display()))?;
    parse_chunks(&content, path.extension().is_some_and(|e| e == "json"))
}

fn parse_chunks(content: &str, is_json: bool) -> Result<Vec<String>> {
    if is_json {
        return serde_json::from_str(content).context("corpus source must be a JSON array of strings");
    }
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn print_passages(query: &str, passages: &[RetrievedPassage], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(passages)?),
        OutputFormat::Plain => {
            if passages.is_empty() {
                println!("No passages found for '{query}'.");
            }
            for (rank, p) in passages.iter().enumerate() {
                println!("{:>2}. [{:.4}] #{} {}", rank + 1, p.distance, p.id, p.text);
            }
        }
    }
    Ok(())
}
