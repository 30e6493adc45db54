//! Answer generation over retrieved statute text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::prompts;
use crate::error::{QaError, QaResult};
use crate::llm::{GenerationConfig, LanguageModel};
use crate::types::char_prefix;

const FOLLOW_UP_CUES: [&str; 12] = [
    "那么", "那", "如果", "假如", "还有", "另外", "此外", "进一步", "具体", "详细", "比如", "例如",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    #[default]
    Professional,
    Simple,
    Detailed,
}

impl AnswerStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStyle::Professional => "professional",
            AnswerStyle::Simple => "simple",
            AnswerStyle::Detailed => "detailed",
        }
    }
}

impl fmt::Display for AnswerStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    HowTo,
    Definition,
    YesNo,
    Consequence,
    Procedure,
    General,
}

impl QuestionType {
    /// First matching cue group wins, in declaration order.
    pub fn classify(question: &str) -> Self {
        const CUES: [(QuestionType, &[&str]); 5] = [
            (QuestionType::HowTo, &["怎么办", "如何", "怎样", "怎么做"]),
            (QuestionType::Definition, &["是什么", "什么是", "定义", "含义"]),
            (QuestionType::YesNo, &["是否", "能否", "可以", "允许", "禁止"]),
            (QuestionType::Consequence, &["责任", "后果", "处罚", "赔偿"]),
            (QuestionType::Procedure, &["程序", "流程", "步骤", "手续"]),
        ];

        CUES.iter()
            .find(|(_, cues)| cues.iter().any(|c| question.contains(c)))
            .map(|(t, _)| *t)
            .unwrap_or(QuestionType::General)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::HowTo => "how_to",
            QuestionType::Definition => "definition",
            QuestionType::YesNo => "yes_no",
            QuestionType::Consequence => "consequence",
            QuestionType::Procedure => "procedure",
            QuestionType::General => "general",
        }
    }
}

pub fn is_follow_up(question: &str) -> bool {
    FOLLOW_UP_CUES.iter().any(|cue| question.contains(cue))
}

/// Condensed previous turn appended to the legal context of a follow-up.
pub fn follow_up_excerpt(previous_question: &str, previous_answer: &str, max_chars: usize) -> String {
    format!(
        "\n\n【上下文】\n上一轮问题：{}\n上一轮回答：{}...",
        previous_question,
        char_prefix(previous_answer, max_chars)
    )
}

pub struct QaAgent {
    llm: Arc<dyn LanguageModel>,
    generation: GenerationConfig,
}

impl QaAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, generation: GenerationConfig) -> Self {
        Self { llm, generation }
    }

    pub async fn answer(
        &self,
        question: &str,
        legal_context: &str,
        chat_history: &str,
        style: AnswerStyle,
    ) -> QaResult<String> {
        let prompt = prompts::answer_prompt(style, chat_history, question, legal_context);
        let answer = self
            .llm
            .generate(&prompt, &self.generation)
            .await
            .map_err(|e| QaError::LanguageModel(e.to_string()))?;
        tracing::debug!(style = %style, chars = answer.chars().count(), "Answer generated");
        Ok(answer.trim().to_string())
    }
}
