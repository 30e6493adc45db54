//! OpenAI-compatible embedding client (Ollama, vLLM, hosted APIs).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroUsize;

use super::EmbeddingModel;
use crate::config::EmbeddingConfig;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

pub struct RemoteEmbeddings {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    /// Query embeddings only; document batches are embedded once at build time.
    cache: Mutex<lru::LruCache<String, Vec<f32>>>,
}

impl RemoteEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(120))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()?;

        let capacity = NonZeroUsize::new(config.cache_size.max(1))
            .ok_or_else(|| anyhow!("cache size must be non-zero"))?;

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            dimension = config.dimension,
            "Creating RemoteEmbeddings"
        );

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimension: config.dimension,
            cache: Mutex::new(lru::LruCache::new(capacity)),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::error!(endpoint = %self.endpoint, "Embedding request timed out");
                anyhow!("Embedding request to {} timed out", self.endpoint)
            } else if e.is_connect() {
                tracing::error!(endpoint = %self.endpoint, error = %e, "Embedding connection failed");
                anyhow!("Failed to connect to embedding service at {}: {}", self.endpoint, e)
            } else {
                anyhow!("Embedding request to {} failed: {}", self.endpoint, e)
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read embedding response body: {}", e))?;
        if !status.is_success() {
            tracing::error!(status = %status, error = %text, "Embedding service returned error");
            return Err(anyhow!("Embedding service error ({}): {}", status, text));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(300).collect();
            anyhow!("Failed to parse embedding response (HTTP {}): {}. Body: {}", status, e, preview)
        })?;

        if parsed.data.len() != texts.len() {
            return Err(anyhow!(
                "Embedding service returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            ));
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingModel for RemoteEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let cached = self.cache.lock().get(text).cloned();
        if let Some(embedding) = cached {
            return Ok(embedding);
        }

        let embedding = self
            .request(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow!("Embedding service returned no vector for query"))?;

        self.cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(count = texts.len(), "Embedding document batch");
        self.request(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
