//! docrag CLI - Command-line interface
//!
//! Usage:
//!   docrag build [--input DIR]
//!   docrag query <question> [--top-k N] [--no-generate] [--json]
//!   docrag chunk <file>

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docrag_core::{AppConfig, LoggingConfig, ScoredChunk};
use docrag_parser::{load_documents, Chunker, ParserRegistry};
use docrag_rag::{create_llm_client, IndexBuilder, RagPipeline, Retriever};
use docrag_vector::{create_embedder, FlatIndex, VectorIndex};
use tracing_subscriber::EnvFilter;

/// Crates whose log output is controlled by `logging.level`
const LOG_TARGETS: [&str; 5] = [
    "docrag_cli",
    "docrag_core",
    "docrag_parser",
    "docrag_vector",
    "docrag_rag",
];

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Document retrieval and grounded question answering")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables take precedence)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of documents
    Build {
        /// Directory of documents (defaults to index.documents_dir)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Query the index
    Query {
        /// Question to ask
        question: String,

        /// Number of passages to retrieve (defaults to retrieval.top_k)
        #[arg(long)]
        top_k: Option<usize>,

        /// Only print the retrieved passages
        #[arg(long)]
        no_generate: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the chunks of one document as JSON lines
    Chunk {
        /// Document to chunk
        file: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={}", config.level))
            .collect();
        EnvFilter::new(directives.join(","))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Build { input } => build(&config, input).await,
        Commands::Query {
            question,
            top_k,
            no_generate,
            json,
        } => {
            let top_k = top_k.unwrap_or(config.retrieval.top_k);
            query(&config, &question, top_k, no_generate, json).await
        }
        Commands::Chunk { file } => chunk(&config, &file),
    }
}

async fn build(config: &AppConfig, input: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = input.unwrap_or_else(|| config.index.documents_dir.clone());
    tracing::info!("Building index from {}", dir.display());

    let documents = tokio::task::spawn_blocking(move || {
        load_documents(&dir, &ParserRegistry::with_defaults())
    })
    .await??;

    let chunker = Chunker::new(config.chunking)?;
    let embedder = create_embedder(&config.embedding, config.index.dim)?;
    let builder = IndexBuilder::new(chunker, embedder)
        .with_batch_size(config.embedding.batch_size)
        .with_concurrency(config.embedding.concurrency);

    let index = builder
        .build_and_save(
            &documents,
            &config.index.vector_path,
            &config.index.metadata_path,
        )
        .await
        .context("index build failed")?;

    println!(
        "Indexed {} chunks from {} documents into {}",
        index.len(),
        documents.len(),
        config.index.vector_path.display()
    );
    Ok(())
}

async fn query(
    config: &AppConfig,
    question: &str,
    top_k: usize,
    no_generate: bool,
    json: bool,
) -> anyhow::Result<()> {
    let vector_path = config.index.vector_path.clone();
    let metadata_path = config.index.metadata_path.clone();
    let index = tokio::task::spawn_blocking(move || FlatIndex::open(&vector_path, &metadata_path))
        .await?
        .context("could not load the index; run `docrag build` first")?;

    if index.dim() != config.index.dim {
        tracing::warn!(
            "Index dimension {} differs from configured {}",
            index.dim(),
            config.index.dim
        );
    }

    let embedder = create_embedder(&config.embedding, index.dim())?;
    let index: Arc<dyn VectorIndex> = Arc::new(index);
    let retriever = Retriever::new(index, embedder);

    if no_generate {
        let passages = retriever.retrieve(question, top_k).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&passages)?);
        } else {
            print_passages(&passages);
        }
        return Ok(());
    }

    let llm_client = create_llm_client(&config.llm)?;
    let pipeline = RagPipeline::new(retriever, llm_client);
    let answer = pipeline.answer(question, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{}\n", answer.answer);
        print_passages(&answer.passages);
    }
    Ok(())
}

fn print_passages(passages: &[ScoredChunk]) {
    for (i, passage) in passages.iter().enumerate() {
        println!(
            "[{}] {} (distance {:.4})",
            i + 1,
            passage.metadata.doc_id,
            passage.distance
        );
        println!("    {}", passage.metadata.text.replace('\n', "\n    "));
    }
}

fn chunk(config: &AppConfig, file: &Path) -> anyhow::Result<()> {
    let parsed = ParserRegistry::with_defaults()
        .parse(file)
        .with_context(|| format!("could not read {}", file.display()))?;

    let chunker = Chunker::new(config.chunking)?;
    for chunk in chunker.chunk(&parsed.into_document()) {
        println!("{}", serde_json::to_string(&chunk)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_flags() {
        let cli = Cli::try_parse_from([
            "docrag",
            "--config",
            "docrag.toml",
            "query",
            "What is RAG?",
            "--top-k",
            "3",
            "--no-generate",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("docrag.toml")));
        match cli.command {
            Commands::Query {
                question,
                top_k,
                no_generate,
                json,
            } => {
                assert_eq!(question, "What is RAG?");
                assert_eq!(top_k, Some(3));
                assert!(no_generate);
                assert!(!json);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_parse_build_default_input() {
        let cli = Cli::try_parse_from(["docrag", "build"]).unwrap();
        assert!(matches!(cli.command, Commands::Build { input: None }));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["docrag"]).is_err());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docrag.toml");
        std::fs::write(&path, "[chunking]\nmax_chars = 200\noverlap_chars = 10\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.chunking.max_chars, 200);
        assert_eq!(config.chunking.overlap_chars, 10);
    }

    #[test]
    fn test_load_config_rejects_bad_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docrag.toml");
        std::fs::write(&path, "[chunking]\nmax_chars = 10\noverlap_chars = 10\n").unwrap();

        assert!(load_config(Some(&path)).is_err());
    }
}
