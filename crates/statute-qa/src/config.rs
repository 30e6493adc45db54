use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::search::RetrievalParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    pub data_dir: PathBuf,
    pub corpus_dir: PathBuf,
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub coordinator: CoordinatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub dimension: usize,
    pub batch_size: usize,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityTiers {
    pub simple: RetrievalParams,
    pub moderate: RetrievalParams,
    pub complex: RetrievalParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Parameters for direct tool calls that carry no explicit `k` / `min_score`.
    pub default_k: usize,
    pub default_min_score: f32,
    /// Parameters used when the agent path is abandoned.
    pub fallback_k: usize,
    pub fallback_min_score: f32,
    pub tiers: ComplexityTiers,
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Token budget for retained messages plus the running summary.
    pub max_token_limit: usize,
    pub title_max_chars: usize,
    /// Messages rendered into prompts as chat history.
    pub context_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub max_format_retries: usize,
    pub agent_timeout_secs: u64,
    pub agent_max_iterations: usize,
    pub batch_delay_ms: u64,
    pub follow_up_excerpt_chars: usize,
    pub summary_max_chars: usize,
}

impl QaConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.embedding.batch_size == 0 {
            return Err("embedding.batch_size must be > 0".into());
        }
        if self.memory.max_token_limit == 0 {
            return Err("memory.max_token_limit must be > 0".into());
        }
        if self.retrieval.default_k == 0 || self.retrieval.fallback_k == 0 {
            return Err("retrieval.default_k and retrieval.fallback_k must be > 0".into());
        }
        for score in [
            self.retrieval.default_min_score,
            self.retrieval.fallback_min_score,
        ] {
            if !(-1.0..=1.0).contains(&score) {
                return Err("retrieval thresholds must be in [-1.0, 1.0]".into());
            }
        }
        let tiers = &self.retrieval.tiers;
        for (name, params) in [
            ("simple", tiers.simple),
            ("moderate", tiers.moderate),
            ("complex", tiers.complex),
        ] {
            params
                .validate()
                .map_err(|e| format!("retrieval.tiers.{}: {}", name, e))?;
        }
        if self.coordinator.agent_max_iterations == 0 {
            return Err("coordinator.agent_max_iterations must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for QaConfig {
    fn default() -> Self {
        let data_dir = if let Ok(env_path) = std::env::var("STATUTE_QA_DATA_DIR") {
            PathBuf::from(env_path)
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("statute-qa")
        };

        Self {
            corpus_dir: data_dir.join("LawData"),
            index_path: data_dir.join("law_index.sqix"),
            metadata_path: data_dir.join("law_metadata.msgpack"),
            data_dir,
            embedding: EmbeddingConfig {
                endpoint: "http://localhost:11434/v1/embeddings".to_string(),
                model: "bge-large-zh-v1.5".to_string(),
                api_key: None,
                dimension: 1024,
                batch_size: 32,
                cache_size: 1000,
            },
            llm: LlmConfig {
                endpoint: "http://localhost:11434/v1/chat/completions".to_string(),
                model: "qwen2.5".to_string(),
                api_key: None,
                temperature: 0.1,
                top_p: 0.8,
                max_tokens: 1000,
                timeout_secs: 300,
            },
            retrieval: RetrievalConfig {
                default_k: 5,
                default_min_score: 0.3,
                fallback_k: 3,
                fallback_min_score: 0.4,
                tiers: ComplexityTiers {
                    simple: RetrievalParams::new(3, 0.4),
                    moderate: RetrievalParams::new(5, 0.3),
                    complex: RetrievalParams::new(8, 0.25),
                },
                history_limit: 50,
            },
            memory: MemoryConfig {
                max_token_limit: 2000,
                title_max_chars: 30,
                context_messages: 10,
            },
            coordinator: CoordinatorConfig {
                max_format_retries: 2,
                agent_timeout_secs: 60,
                agent_max_iterations: 3,
                batch_delay_ms: 500,
                follow_up_excerpt_chars: 200,
                summary_max_chars: 500,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = QaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.tiers.complex.k, 8);
        assert_eq!(config.coordinator.max_format_retries, 2);
    }

    #[test]
    fn test_rejects_zero_k_tier() {
        let mut config = QaConfig::default();
        config.retrieval.tiers.moderate.k = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("moderate"));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = QaConfig::default();
        config.retrieval.fallback_min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = QaConfig::default();
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = QaConfig::from_file(&path).unwrap();
        assert_eq!(loaded.llm.model, "qwen2.5");
        assert_eq!(loaded.memory.max_token_limit, 2000);
    }
}
