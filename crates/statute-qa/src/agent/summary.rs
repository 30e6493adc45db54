//! Conversation summaries and free-form legal content analysis.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::prompts;
use crate::error::{QaError, QaResult};
use crate::llm::{GenerationConfig, LanguageModel};
use crate::memory::summarizer::render_transcript;
use crate::memory::ChatMessage;
use crate::types::char_prefix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    LegalContent,
    LawAnalysis,
    SessionInsights,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::LegalContent => "legal_content",
            AnalysisType::LawAnalysis => "law_analysis",
            AnalysisType::SessionInsights => "session_insights",
        }
    }
}

pub struct SummaryAgent {
    llm: Arc<dyn LanguageModel>,
    generation: GenerationConfig,
    max_chars: usize,
}

impl SummaryAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, generation: GenerationConfig, max_chars: usize) -> Self {
        Self {
            llm,
            generation,
            max_chars,
        }
    }

    /// Summarize a session transcript. Empty history is an invalid request.
    pub async fn summarize_conversation(&self, history: &[ChatMessage]) -> QaResult<String> {
        if history.is_empty() {
            return Err(QaError::InvalidRequest("没有对话历史可以总结".into()));
        }

        let prompt = prompts::conversation_summary_prompt(&render_transcript(history));
        let summary = self.generate(&prompt).await?;
        Ok(self.clip(summary.trim()))
    }

    pub async fn analyze(&self, content: &str, analysis_type: AnalysisType) -> QaResult<String> {
        if content.trim().is_empty() {
            return Err(QaError::InvalidRequest("分析内容为空".into()));
        }

        let prompt = prompts::analysis_prompt(analysis_type, content);
        let analysis = self.generate(&prompt).await?;
        tracing::debug!(analysis_type = analysis_type.as_str(), "Content analyzed");
        Ok(analysis.trim().to_string())
    }

    async fn generate(&self, prompt: &str) -> QaResult<String> {
        self.llm
            .generate(prompt, &self.generation)
            .await
            .map_err(|e| QaError::LanguageModel(e.to_string()))
    }

    fn clip(&self, text: &str) -> String {
        if text.chars().count() > self.max_chars {
            format!("{}...", char_prefix(text, self.max_chars))
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;

    fn agent(llm: Arc<ScriptedLlm>, max_chars: usize) -> SummaryAgent {
        SummaryAgent::new(llm, GenerationConfig::default(), max_chars)
    }

    #[tokio::test]
    async fn test_summarize_empty_history_fails() {
        let llm = Arc::new(ScriptedLlm::new(["unused"]));
        let out = agent(llm.clone(), 100).summarize_conversation(&[]).await;
        assert!(matches!(out, Err(QaError::InvalidRequest(_))));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_summary_is_clipped() {
        let llm = Arc::new(ScriptedLlm::new(["总".repeat(50)]));
        let history = vec![ChatMessage::user("劳动合同怎么解除"), ChatMessage::assistant("依据第二十五条")];
        let summary = agent(llm.clone(), 10).summarize_conversation(&history).await.unwrap();
        assert_eq!(summary, format!("{}...", "总".repeat(10)));
        assert!(llm.prompts()[0].contains("用户: 劳动合同怎么解除"));
    }

    #[tokio::test]
    async fn test_analyze_uses_type_prompt() {
        let llm = Arc::new(ScriptedLlm::new(["分析结果"]));
        let out = agent(llm.clone(), 100)
            .analyze("第一条 内容", AnalysisType::LawAnalysis)
            .await
            .unwrap();
        assert_eq!(out, "分析结果");
        assert!(llm.prompts()[0].contains("条文解读"));
    }

    #[test]
    fn test_analysis_type_serde() {
        let t: AnalysisType = serde_json::from_str("\"session_insights\"").unwrap();
        assert_eq!(t, AnalysisType::SessionInsights);
        assert_eq!(AnalysisType::default(), AnalysisType::LegalContent);
    }
}
