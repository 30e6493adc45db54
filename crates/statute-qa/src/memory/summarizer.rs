//! Folding evicted conversation turns into the running session summary.
//!
//! The language model does the real work; [`condense`] is the rule-based
//! fallback when it is unavailable.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};

use super::types::{ChatMessage, Role};
use crate::llm::{GenerationConfig, LanguageModel};
use crate::search::complexity::LEGAL_KEYWORDS;
use crate::types::char_prefix;

static ARTICLE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"第[一二三四五六七八九十百千万零○〇\d]+条").expect("article reference regex is valid")
});
static LAW_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"《[^》]{1,40}》").expect("law title regex is valid"));

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Merge `transcript` (rendered evicted turns) into `previous_summary`.
    async fn summarize(&self, previous_summary: &str, transcript: &str) -> Result<String>;
}

pub struct LlmSummarizer {
    llm: Arc<dyn LanguageModel>,
    config: GenerationConfig,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LanguageModel>, config: GenerationConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, previous_summary: &str, transcript: &str) -> Result<String> {
        let prompt = format!(
            "请逐步总结以下对话内容，将新的对话内容合并到已有总结中，生成新的总结。\
             保留用户关注的法律问题、涉及的法律条文和已给出的结论，省略寒暄。\n\n\
             已有总结：\n{}\n\n新的对话内容：\n{}\n\n新的总结：",
            if previous_summary.is_empty() { "（无）" } else { previous_summary },
            transcript
        );
        let summary = self.llm.generate(&prompt, &self.config).await?;
        Ok(summary.trim().to_string())
    }
}

/// Render messages as `用户: ..` / `助手: ..` lines.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(ChatMessage::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rule-based summary: earlier questions plus the law names, article
/// references and legal terms mentioned in the evicted turns.
pub fn condense(previous_summary: &str, evicted: &[ChatMessage]) -> String {
    let mut topics: Vec<String> = Vec::new();
    let mut references: Vec<String> = Vec::new();
    let mut terms: Vec<&str> = Vec::new();

    for msg in evicted {
        if msg.role == Role::User {
            let topic = char_prefix(msg.content.trim(), 40).to_string();
            if !topic.is_empty() {
                topics.push(topic);
            }
        }

        for m in LAW_TITLE_RE
            .find_iter(&msg.content)
            .chain(ARTICLE_REF_RE.find_iter(&msg.content))
        {
            let r = m.as_str().to_string();
            if !references.contains(&r) {
                references.push(r);
            }
        }

        for kw in LEGAL_KEYWORDS {
            if msg.content.contains(kw) && !terms.contains(&kw) {
                terms.push(kw);
            }
        }
    }

    topics.truncate(5);
    references.truncate(10);

    let mut parts = Vec::new();
    if !previous_summary.trim().is_empty() {
        parts.push(previous_summary.trim().to_string());
    }
    if !topics.is_empty() {
        parts.push(format!("此前问题：{}", topics.join("；")));
    }
    if !references.is_empty() {
        parts.push(format!("涉及条文：{}", references.join("、")));
    }
    if !terms.is_empty() {
        parts.push(format!("关键词：{}", terms.join("、")));
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;

    #[test]
    fn test_condense_collects_questions_and_references() {
        let evicted = vec![
            ChatMessage::user("试用期内可以解除劳动合同吗？"),
            ChatMessage::assistant("根据《劳动合同法》第三十九条，用人单位可以解除，需承担相应责任。"),
            ChatMessage::user("违约金怎么计算？"),
            ChatMessage::assistant("参见第二十二条。"),
        ];
        let summary = condense("用户咨询劳动纠纷。", &evicted);
        assert!(summary.starts_with("用户咨询劳动纠纷。"));
        assert!(summary.contains("此前问题：试用期内可以解除劳动合同吗？；违约金怎么计算？"));
        assert!(summary.contains("《劳动合同法》"));
        assert!(summary.contains("第三十九条"));
        assert!(summary.contains("第二十二条"));
        assert!(summary.contains("责任"));
    }

    #[test]
    fn test_condense_empty() {
        assert_eq!(condense("", &[]), "");
    }

    #[test]
    fn test_render_transcript() {
        let text = render_transcript(&[ChatMessage::user("问"), ChatMessage::assistant("答")]);
        assert_eq!(text, "用户: 问\n助手: 答");
    }

    #[tokio::test]
    async fn test_llm_summarizer_uses_model_output() {
        let llm = Arc::new(ScriptedLlm::new(["  新总结  "]));
        let summarizer = LlmSummarizer::new(llm.clone(), GenerationConfig::default());
        let out = summarizer.summarize("旧总结", "用户: 问").await.unwrap();
        assert_eq!(out, "新总结");
        assert!(llm.prompts()[0].contains("旧总结"));
    }
}
