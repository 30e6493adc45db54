//! Build the statute vector index from a corpus directory.
//!
//! Usage: `statute-index [config.json]`. Without a config file the default
//! configuration is used (data under `STATUTE_QA_DATA_DIR` or the platform
//! data directory).

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use statute_qa::config::QaConfig;
use statute_qa::embeddings::RemoteEmbeddings;
use statute_qa::indexing;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => QaConfig::from_file(&PathBuf::from(&path))
            .map_err(|e| anyhow!("{}: {}", path, e))?,
        None => {
            let config = QaConfig::default();
            config.validate().map_err(|e| anyhow!(e))?;
            config
        }
    };

    tracing::info!(
        corpus = %config.corpus_dir.display(),
        index = %config.index_path.display(),
        metadata = %config.metadata_path.display(),
        model = %config.embedding.model,
        "Building statute index"
    );

    let embedder = RemoteEmbeddings::new(&config.embedding)
        .context("Failed to create embedding client")?;
    let report = indexing::build_from_corpus(&config, &embedder, true)
        .await
        .context("Index build failed")?;

    tracing::info!(
        laws = report.laws,
        segments = report.segments,
        dimension = report.dimension,
        duration_ms = report.duration_ms,
        "Index build complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
