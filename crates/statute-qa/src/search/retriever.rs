use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::complexity::{classify_query, QueryComplexity, RetrievalParams};
use super::sanitize::clean_query;
use crate::config::{ComplexityTiers, QaConfig, RetrievalConfig};
use crate::embeddings::{l2_normalize, EmbeddingModel};
use crate::error::{QaError, QaResult};
use crate::storage::{self, EmbeddingIndex};
use crate::types::LegalSegment;

/// Tool output when nothing clears the threshold.
pub const NO_RESULTS_TEXT: &str = "未找到相关的法律条文。";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRecord {
    pub query: String,
    pub complexity: QueryComplexity,
    pub params: RetrievalParams,
    pub doc_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalInsights {
    pub total_queries: usize,
    pub average_documents: f64,
    pub complexity_distribution: HashMap<String, usize>,
    pub recent: Vec<RetrievalRecord>,
}

#[derive(Debug, Clone)]
pub struct AdaptiveRetrieval {
    pub complexity: QueryComplexity,
    pub params: RetrievalParams,
    pub results: Vec<LegalSegment>,
}

/// Sanitize → embed → exact search → threshold, over a read-only index.
pub struct LawRetriever {
    index: EmbeddingIndex,
    segments: Vec<LegalSegment>,
    embedder: Arc<dyn EmbeddingModel>,
    tiers: ComplexityTiers,
    history: Mutex<VecDeque<RetrievalRecord>>,
    history_limit: usize,
}

impl LawRetriever {
    pub fn new(
        index: EmbeddingIndex,
        segments: Vec<LegalSegment>,
        embedder: Arc<dyn EmbeddingModel>,
        config: &RetrievalConfig,
    ) -> QaResult<Self> {
        if index.len() != segments.len() {
            return Err(QaError::IndexUnavailable(format!(
                "index has {} vectors but {} segments",
                index.len(),
                segments.len()
            )));
        }
        Ok(Self {
            index,
            segments,
            embedder,
            tiers: config.tiers.clone(),
            history: Mutex::new(VecDeque::new()),
            history_limit: config.history_limit.max(1),
        })
    }

    /// Load the persisted index named by `config`.
    pub fn open(config: &QaConfig, embedder: Arc<dyn EmbeddingModel>) -> QaResult<Self> {
        let (index, segments) = storage::load(&config.index_path, &config.metadata_path)?;
        Self::new(index, segments, embedder, &config.retrieval)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Complexity tier of `query` and the retrieval parameters configured for it.
    pub fn adaptive_params(&self, query: &str) -> (QueryComplexity, RetrievalParams) {
        let complexity = classify_query(query);
        (complexity, complexity.params(&self.tiers))
    }

    /// Up to `k` scored copies of stored segments, descending by score, all `>= min_score`.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        min_score: f32,
    ) -> QaResult<Vec<LegalSegment>> {
        let params = RetrievalParams::new(k, min_score);
        params.validate().map_err(QaError::InvalidRequest)?;

        let cleaned = clean_query(query);
        if cleaned.is_empty() {
            tracing::debug!(raw = %query, "Query empty after sanitization");
            self.record(query, classify_query(query), params, 0);
            return Ok(Vec::new());
        }

        let mut vector = self
            .embedder
            .embed_query(&cleaned)
            .await
            .map_err(|e| QaError::EmbeddingService(e.to_string()))?;
        l2_normalize(&mut vector);

        let hits = self.index.search(&vector, k)?;
        let results: Vec<LegalSegment> = hits
            .into_iter()
            .filter(|(_, score)| *score >= min_score)
            .filter_map(|(i, score)| self.segments.get(i).map(|s| s.with_score(score)))
            .collect();

        tracing::debug!(
            query = %cleaned,
            k,
            min_score,
            found = results.len(),
            "Retrieval complete"
        );
        self.record(query, classify_query(query), params, results.len());
        Ok(results)
    }

    /// Retrieve with parameters picked from the query's complexity tier.
    pub async fn retrieve_adaptive(&self, query: &str) -> QaResult<AdaptiveRetrieval> {
        let (complexity, params) = self.adaptive_params(query);
        tracing::debug!(
            complexity = %complexity,
            k = params.k,
            min_score = params.min_score,
            "Adaptive retrieval parameters"
        );
        let results = self.retrieve(query, params.k, params.min_score).await?;
        Ok(AdaptiveRetrieval {
            complexity,
            params,
            results,
        })
    }

    fn record(
        &self,
        query: &str,
        complexity: QueryComplexity,
        params: RetrievalParams,
        doc_count: usize,
    ) {
        let mut history = self.history.lock();
        history.push_back(RetrievalRecord {
            query: query.to_string(),
            complexity,
            params,
            doc_count,
        });
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    pub fn insights(&self) -> RetrievalInsights {
        let history = self.history.lock();
        let total = history.len();
        let average_documents = if total == 0 {
            0.0
        } else {
            history.iter().map(|r| r.doc_count).sum::<usize>() as f64 / total as f64
        };

        let mut complexity_distribution = HashMap::new();
        for record in history.iter() {
            *complexity_distribution
                .entry(record.complexity.as_str().to_string())
                .or_insert(0) += 1;
        }

        let recent = history.iter().rev().take(5).rev().cloned().collect();

        RetrievalInsights {
            total_queries: total,
            average_documents,
            complexity_distribution,
            recent,
        }
    }
}

/// Render results as the numbered blocks handed back to the agent.
pub fn format_results(results: &[LegalSegment]) -> String {
    if results.is_empty() {
        return NO_RESULTS_TEXT.to_string();
    }
    let blocks: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, seg)| seg.format_for_context(i + 1))
        .collect();
    format!("\n{}", blocks.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{retriever_for, sample_segments, FailingEmbedder, HashingEmbedder};
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_results_bounded_sorted_and_thresholded() {
        let retriever = retriever_for(sample_segments(), HashingEmbedder::new(64)).await;
        let results = retriever.retrieve("劳动合同解除", 3, -1.0).await.unwrap();

        assert!(results.len() <= 3);
        assert!(!results.is_empty());
        let scores: Vec<f32> = results.iter().map(|r| r.similarity_score.unwrap()).collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }

        let strict = retriever.retrieve("劳动合同解除", 10, 0.5).await.unwrap();
        assert!(strict.iter().all(|r| r.similarity_score.unwrap() >= 0.5));
    }

    #[tokio::test]
    async fn test_stored_metadata_not_mutated() {
        let retriever = retriever_for(sample_segments(), HashingEmbedder::new(64)).await;
        let _ = retriever.retrieve("合同", 5, -1.0).await.unwrap();
        assert!(retriever.segments.iter().all(|s| s.similarity_score.is_none()));
    }

    #[tokio::test]
    async fn test_best_match_ranked_first() {
        let segments = sample_segments();
        let target = segments[1].embedding_text();
        let retriever = retriever_for(segments.clone(), HashingEmbedder::new(64)).await;

        let results = retriever.retrieve(&target, 1, -1.0).await.unwrap();
        assert_eq!(results[0].article, segments[1].article);
        assert!((results[0].similarity_score.unwrap() - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_empty_after_sanitize_skips_embedder() {
        let embedder = HashingEmbedder::new(32);
        let retriever = retriever_for(sample_segments(), embedder.clone()).await;
        let results = retriever.retrieve("  ？ ", 3, 0.0).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(embedder.query_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_params_rejected() {
        let retriever = retriever_for(sample_segments(), HashingEmbedder::new(32)).await;
        assert!(matches!(
            retriever.retrieve("合同", 0, 0.3).await,
            Err(QaError::InvalidRequest(_))
        ));
        assert!(matches!(
            retriever.retrieve("合同", 3, 2.0).await,
            Err(QaError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_maps_to_service_error() {
        let (index, segments) = crate::indexing::build(
            sample_segments(),
            &HashingEmbedder::new(8),
            8,
            false,
        )
        .await
        .unwrap();
        let retriever = LawRetriever::new(
            index,
            segments,
            Arc::new(FailingEmbedder),
            &QaConfig::default().retrieval,
        )
        .unwrap();
        assert!(matches!(
            retriever.retrieve("合同", 3, 0.3).await,
            Err(QaError::EmbeddingService(_))
        ));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_index_unavailable() {
        let (index, segments) = crate::indexing::build(
            sample_segments(),
            &HashingEmbedder::new(8),
            8,
            false,
        )
        .await
        .unwrap();
        let retriever = LawRetriever::new(
            index,
            segments,
            Arc::new(HashingEmbedder::new(16)),
            &QaConfig::default().retrieval,
        )
        .unwrap();
        assert!(matches!(
            retriever.retrieve("合同", 3, 0.3).await,
            Err(QaError::IndexUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_adaptive_uses_tier_and_records_history() {
        let retriever = retriever_for(sample_segments(), HashingEmbedder::new(32)).await;
        let outcome = retriever.retrieve_adaptive("什么是合同？").await.unwrap();
        assert_eq!(outcome.complexity, QueryComplexity::Simple);
        assert_eq!(outcome.params, RetrievalParams::new(3, 0.4));
        assert!(outcome.results.len() <= 3);

        let insights = retriever.insights();
        assert_eq!(insights.total_queries, 1);
        assert_eq!(insights.complexity_distribution.get("simple"), Some(&1));
    }

    #[test]
    fn test_format_results() {
        assert_eq!(format_results(&[]), NO_RESULTS_TEXT);
        let seg = sample_segments()[0].with_score(0.87654);
        let text = format_results(&[seg]);
        assert!(text.contains("【检索结果 1】"));
        assert!(text.contains("相似度：0.877"));
    }

    proptest! {
        #[test]
        fn prop_results_bounded_thresholded_and_descending(
            query in "[合同劳动解除租赁责任？ a-z]{0,16}",
            k in 1usize..=6,
            min_score in -1.0f32..1.0,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let results = runtime.block_on(async {
                let retriever = retriever_for(sample_segments(), HashingEmbedder::new(32)).await;
                retriever.retrieve(&query, k, min_score).await.unwrap()
            });

            prop_assert!(results.len() <= k);
            let scores: Vec<f32> = results.iter().map(|r| r.similarity_score.unwrap()).collect();
            prop_assert!(scores.iter().all(|s| *s >= min_score));
            prop_assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}
