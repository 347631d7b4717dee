use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use query_pipeline::{Ingestor, QueryPipeline};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "knowledge-query", about = "Retrieval-backed question answering over ingested documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer a question against the ingested knowledge base
    Ask {
        /// The question to answer
        question: String,
    },
    /// Split, embed and store documents from a directory
    Ingest {
        /// Directory holding .md and .txt documents; defaults to the
        /// configured data_dir
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print aggregated request metrics
    Metrics,
    /// Print component readiness
    Health,
    /// Drop every cached answer
    FlushCache,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await
        .context("failed to connect to the database")?,
    );

    let pipeline = QueryPipeline::new(db, &config).await?;

    match cli.command {
        Command::Ask { question } => {
            let outcome = pipeline.ask(&question).await?;
            println!("{}", outcome.answer);
            if !outcome.sources.is_empty() {
                println!("\nSources: {}", outcome.sources.join(", "));
            }
            info!(
                cached = outcome.cached,
                latency_ms = outcome.latency_ms,
                tokens_used = outcome.tokens_used,
                "Question answered"
            );
        }
        Command::Ingest { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.data_dir));
            let ingestor = Ingestor::new(
                pipeline.embedder(),
                pipeline.chunk_store(),
                config.chunk_size,
                config.chunk_overlap,
            );
            let (documents, chunks) = ingest_directory(&ingestor, &dir).await?;
            println!("Ingested {documents} documents ({chunks} chunks) from {}", dir.display());
        }
        Command::Metrics => {
            let snapshot = pipeline.metrics_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Health => {
            let health = pipeline.health().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::FlushCache => {
            pipeline.flush_cache().await?;
            println!("Cache flushed");
        }
    }

    Ok(())
}

/// Ingests every .md and .txt file directly inside `dir`, keyed by file name.
async fn ingest_directory(
    ingestor: &Ingestor,
    dir: &std::path::Path,
) -> anyhow::Result<(usize, usize)> {
    let mut documents = 0;
    let mut chunks = 0;

    let entries =
        std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "md" | "txt"));
        if !path.is_file() || !supported {
            continue;
        }

        let source = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unnamed")
            .to_string();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;

        chunks += ingestor.ingest_document(&source, &text).await?;
        documents += 1;
    }

    Ok((documents, chunks))
}
