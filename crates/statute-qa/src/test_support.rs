//! Deterministic service doubles for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::QaConfig;
use crate::embeddings::EmbeddingModel;
use crate::llm::{GenerationConfig, LanguageModel};
use crate::memory::Summarizer;
use crate::search::LawRetriever;
use crate::types::LegalSegment;

/// Character-bucket embedder: texts sharing characters score higher.
#[derive(Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    query_calls: Arc<AtomicUsize>,
    document_calls: Arc<AtomicUsize>,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            query_calls: Arc::new(AtomicUsize::new(0)),
            document_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn document_calls(&self) -> usize {
        self.document_calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            let mut hasher = DefaultHasher::new();
            c.hash(&mut hasher);
            v[(hasher.finish() as usize) % self.dimension] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingModel for HashingEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedding service that is always down.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingModel for FailingEmbedder {
    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("connection refused"))
    }

    fn dimension(&self) -> usize {
        8
    }
}

/// LLM that replays canned responses in order, then repeats `fallback`.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow!("scripted LLM exhausted"))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Summarizer that always fails, forcing the rule-based fallback.
pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _previous: &str, _transcript: &str) -> Result<String> {
        Err(anyhow!("summarizer offline"))
    }
}

/// Summarizer that returns a fixed short summary.
pub struct FixedSummarizer(pub String);

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _previous: &str, _transcript: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

pub fn sample_segments() -> Vec<LegalSegment> {
    let rows = [
        ("劳动法.txt", "中华人民共和国劳动法", "第三章 劳动合同和集体合同", "第二十五条", "劳动者严重违反劳动纪律的，用人单位可以解除劳动合同。"),
        ("劳动法.txt", "中华人民共和国劳动法", "第三章 劳动合同和集体合同", "第三十一条", "劳动者解除劳动合同，应当提前三十日以书面形式通知用人单位。"),
        ("民法典.txt", "中华人民共和国民法典", "第三编 合同", "第四百六十四条", "合同是民事主体之间设立、变更、终止民事法律关系的协议。"),
        ("民法典.txt", "中华人民共和国民法典", "第三编 合同", "第五百七十七条", "当事人一方不履行合同义务的，应当承担继续履行、采取补救措施或者赔偿损失等违约责任。"),
        ("刑法.txt", "中华人民共和国刑法", "第二章 犯罪", "第十七条", "已满十六周岁的人犯罪，应当负刑事责任。"),
    ];
    rows.iter()
        .map(|(law, title, chapter, article, content)| LegalSegment {
            law_name: law.to_string(),
            title: title.to_string(),
            chapter: chapter.to_string(),
            section: String::new(),
            article: article.to_string(),
            content: content.to_string(),
            similarity_score: None,
        })
        .collect()
}

/// Build an in-memory retriever over `segments`.
pub async fn retriever_for(segments: Vec<LegalSegment>, embedder: HashingEmbedder) -> LawRetriever {
    let (index, segments) = crate::indexing::build(segments, &embedder, 4, false)
        .await
        .expect("test index builds");
    LawRetriever::new(
        index,
        segments,
        Arc::new(embedder),
        &QaConfig::default().retrieval,
    )
    .expect("test retriever builds")
}
