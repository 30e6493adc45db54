use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One addressable provision of a statute together with its position in the
/// chapter / section / article hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalSegment {
    pub law_name: String,
    pub title: String,
    pub chapter: String,
    pub section: String,
    pub article: String,
    pub content: String,
    /// Only set on copies handed out by the retriever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
}

impl LegalSegment {
    /// Text handed to the embedding service for this segment.
    pub fn embedding_text(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.title, self.chapter, self.section, self.article, self.content
        )
    }

    /// Copy of this segment annotated with a similarity score.
    pub fn with_score(&self, score: f32) -> Self {
        Self {
            similarity_score: Some(score),
            ..self.clone()
        }
    }

    /// Render as a numbered retrieval block for prompts and tool observations.
    pub fn format_for_context(&self, rank: usize) -> String {
        let mut out = format!("【检索结果 {}】\n", rank);
        out.push_str(&format!("法律名称：{}\n", self.law_name));
        if !self.chapter.is_empty() {
            out.push_str(&format!("章节：{}\n", self.chapter));
        }
        if !self.section.is_empty() {
            out.push_str(&format!("节：{}\n", self.section));
        }
        out.push_str(&format!("条文：{}\n", self.article));
        out.push_str(&format!("内容：{}\n", self.content));
        if let Some(score) = self.similarity_score {
            out.push_str(&format!("相似度：{:.3}\n", score));
        }
        out
    }
}

/// A raw statute file read from the corpus directory.
#[derive(Debug, Clone)]
pub struct LawDocument {
    pub law_name: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Qa,
    Summary,
    Analysis,
}

/// One coordinator invocation, created per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: String,
    pub task_type: TaskType,
    pub input: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AgentTask {
    pub fn new(task_type: TaskType, input: serde_json::Value) -> Self {
        Self {
            task_id: format!("{}_task_{}", task_type.as_str(), Uuid::new_v4().simple()),
            task_type,
            input,
            created_at: Utc::now(),
        }
    }
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Qa => "qa",
            TaskType::Summary => "summary",
            TaskType::Analysis => "analysis",
        }
    }
}

/// Outcome of an [`AgentTask`]. Failures carry a message instead of an error value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub task_id: String,
    pub task_type: TaskType,
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResult {
    pub fn ok(task: &AgentTask, data: serde_json::Value, execution_time_ms: u64) -> Self {
        Self {
            task_id: task.task_id.clone(),
            task_type: task.task_type,
            success: true,
            data,
            error: None,
            execution_time_ms,
            metadata: HashMap::new(),
        }
    }

    pub fn failed(task: &AgentTask, error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            task_id: task.task_id.clone(),
            task_type: task.task_type,
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
            execution_time_ms,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Rough token estimate used for memory budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

/// First `max_chars` characters of `text`, char-boundary safe.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
