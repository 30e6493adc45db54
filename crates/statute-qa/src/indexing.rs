//! Offline index build: segments in, normalized vector index out.
//!
//! Embedding inputs are sent to the embedding service in fixed-size batches;
//! progress is reported on an `indicatif` bar when requested.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::QaConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::{QaError, QaResult};
use crate::processing::{load_corpus, segment_corpus};
use crate::storage::{self, EmbeddingIndex};
use crate::types::LegalSegment;

// ── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBuildReport {
    pub laws: usize,
    pub segments: usize,
    pub dimension: usize,
    pub duration_ms: u64,
}

// ── Build ──────────────────────────────────────────────────────────────────

/// Embed every segment and return the index with the segments it pairs with.
pub async fn build(
    segments: Vec<LegalSegment>,
    embedder: &dyn EmbeddingModel,
    batch_size: usize,
    show_progress: bool,
) -> QaResult<(EmbeddingIndex, Vec<LegalSegment>)> {
    if segments.is_empty() {
        return Err(QaError::InvalidRequest(
            "cannot build an index from an empty segment list".into(),
        ));
    }
    let batch_size = batch_size.max(1);

    let inputs: Vec<String> = segments.iter().map(LegalSegment::embedding_text).collect();

    let pb = if show_progress {
        let pb = ProgressBar::new(inputs.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut rows: Vec<Vec<f32>> = Vec::with_capacity(inputs.len());
    for (batch_no, batch) in inputs.chunks(batch_size).enumerate() {
        let vectors = embedder.embed_documents(batch).await.map_err(|e| {
            tracing::error!(batch = batch_no, error = %e, "Embedding batch failed");
            QaError::EmbeddingService(e.to_string())
        })?;
        if vectors.len() != batch.len() {
            return Err(QaError::EmbeddingService(format!(
                "batch {} returned {} vectors for {} inputs",
                batch_no,
                vectors.len(),
                batch.len()
            )));
        }
        rows.extend(vectors);
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    let index = EmbeddingIndex::from_rows(rows)?;
    tracing::info!(
        vectors = index.len(),
        dimension = index.dimension(),
        "Built embedding index"
    );
    Ok((index, segments))
}

/// Corpus directory → segments → index → persisted artifacts.
pub async fn build_from_corpus(
    config: &QaConfig,
    embedder: &dyn EmbeddingModel,
    show_progress: bool,
) -> QaResult<IndexBuildReport> {
    let start = Instant::now();

    let documents = load_corpus(&config.corpus_dir)?;
    let segments = segment_corpus(&documents);

    let (index, segments) = build(
        segments,
        embedder,
        config.embedding.batch_size,
        show_progress,
    )
    .await?;

    if index.dimension() != embedder.dimension() {
        tracing::warn!(
            built = index.dimension(),
            configured = embedder.dimension(),
            "Embedding dimension differs from configuration"
        );
    }

    storage::persist(&index, &segments, &config.index_path, &config.metadata_path)?;

    Ok(IndexBuildReport {
        laws: documents.len(),
        segments: segments.len(),
        dimension: index.dimension(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingEmbedder, HashingEmbedder};

    fn segments(n: usize) -> Vec<LegalSegment> {
        (0..n)
            .map(|i| LegalSegment {
                law_name: "民法典.txt".into(),
                title: "中华人民共和国民法典".into(),
                chapter: "第一章 基本规定".into(),
                section: String::new(),
                article: format!("第{}条", i + 1),
                content: format!("条文内容 {}", i),
                similarity_score: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_build_batches_and_normalizes() {
        let embedder = HashingEmbedder::new(16);
        let (index, segs) = build(segments(7), &embedder, 3, false).await.unwrap();
        assert_eq!(index.len(), 7);
        assert_eq!(segs.len(), 7);
        assert_eq!(embedder.document_calls(), 3);
        for row in index.vectors().rows() {
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn test_build_empty_is_error() {
        let embedder = HashingEmbedder::new(8);
        assert!(build(Vec::new(), &embedder, 4, false).await.is_err());
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces() {
        let err = build(segments(2), &FailingEmbedder, 4, false)
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::EmbeddingService(_)));
    }

    #[tokio::test]
    async fn test_build_from_corpus_persists() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("LawData");
        std::fs::create_dir_all(&corpus).unwrap();
        std::fs::write(
            corpus.join("合同法.txt"),
            "中华人民共和国合同法\n第一章 一般规定\n第一条 为了保护合同当事人的合法权益。\n第二条 本法所称合同。",
        )
        .unwrap();

        let mut config = QaConfig::default();
        config.corpus_dir = corpus;
        config.index_path = dir.path().join("law_index.sqix");
        config.metadata_path = dir.path().join("law_metadata.msgpack");

        let embedder = HashingEmbedder::new(32);
        let report = build_from_corpus(&config, &embedder, false).await.unwrap();
        assert_eq!(report.laws, 1);
        assert_eq!(report.segments, 2);

        let (index, segs) = storage::load(&config.index_path, &config.metadata_path).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(segs[1].article, "第二条");
    }
}
