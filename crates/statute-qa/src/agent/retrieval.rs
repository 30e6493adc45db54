//! ReAct-style retrieval agent: the model decides what to search for, the
//! statute index answers, observations feed back into the next round.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use super::prompts;
use super::react::{self, AgentStep};
use super::tools::{ToolContext, ToolRegistry};
use crate::error::{QaError, QaResult};
use crate::llm::{GenerationConfig, LanguageModel};
use crate::search::{LawRetriever, QueryComplexity, RetrievalParams};
use crate::types::LegalSegment;

const OBSERVATION_STOP: &str = "Observation:";

/// A single tool invocation record for observability.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub input: String,
    pub result: String,
    pub duration_ms: u64,
}

/// The output of one agent run.
#[derive(Debug, Clone)]
pub struct AgentRetrieval {
    /// Final answer text, or the last observation when iterations ran out.
    pub analysis: String,
    pub segments: Vec<LegalSegment>,
    pub complexity: QueryComplexity,
    pub params: RetrievalParams,
    pub tool_invocations: Vec<ToolInvocation>,
    pub iterations: usize,
}

pub struct RetrievalAgent {
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<LawRetriever>,
    tools: ToolRegistry,
    generation: GenerationConfig,
    max_iterations: usize,
}

impl RetrievalAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retriever: Arc<LawRetriever>,
        generation: GenerationConfig,
        max_iterations: usize,
    ) -> Self {
        let tools = ToolRegistry::with_retriever(retriever.clone());
        Self {
            llm,
            retriever,
            tools,
            generation: generation.with_stop(OBSERVATION_STOP),
            max_iterations: max_iterations.max(1),
        }
    }

    /// Run the Thought/Action loop for `question`.
    ///
    /// Output that cannot be repaired is returned as `MalformedAgentOutput`;
    /// tool errors (embedding, index) are returned as-is.
    pub async fn run(&self, question: &str, chat_history: &str) -> QaResult<AgentRetrieval> {
        let (complexity, params) = self.retriever.adaptive_params(question);
        let ctx = ToolContext {
            default_params: params,
        };

        let agent_input = format!(
            "{}\n\n检索参数：k={}, min_score={}",
            question, params.k, params.min_score
        );
        let tool_names = self.tools.list().join(", ");
        let tool_descriptions = self.tools.describe();

        let mut scratchpad = String::new();
        let mut segments: Vec<LegalSegment> = Vec::new();
        let mut tool_invocations = Vec::new();
        let mut last_observation = String::new();
        let mut analysis: Option<String> = None;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let prompt = prompts::retrieval_prompt(
                &tool_descriptions,
                &tool_names,
                chat_history,
                &agent_input,
                &scratchpad,
            );

            let raw = self
                .llm
                .generate(&prompt, &self.generation)
                .await
                .map_err(|e| QaError::LanguageModel(e.to_string()))?;
            // Some backends ignore stop sequences
            let block = match raw.find(OBSERVATION_STOP) {
                Some(pos) => &raw[..pos],
                None => raw.as_str(),
            };

            match react::interpret(block, question)? {
                AgentStep::FinalAnswer(text) => {
                    tracing::debug!(iterations, "Retrieval agent reached final answer");
                    analysis = Some(text);
                    break;
                }
                AgentStep::Action { tool, input } => {
                    let start = Instant::now();
                    let observation = match self.tools.get(&tool) {
                        Some(t) => {
                            let out = t.execute(&input, &ctx).await?;
                            for seg in out.segments {
                                if !segments
                                    .iter()
                                    .any(|s| s.law_name == seg.law_name && s.article == seg.article)
                                {
                                    segments.push(seg);
                                }
                            }
                            out.output
                        }
                        None => {
                            tracing::warn!(tool = %tool, "Agent requested unknown tool");
                            format!("{} 不是可用的工具，请使用以下工具之一：[{}]", tool, tool_names)
                        }
                    };

                    tracing::debug!(tool = %tool, iteration = iterations, "Tool executed");
                    tool_invocations.push(ToolInvocation {
                        tool_name: tool,
                        input,
                        result: observation.clone(),
                        duration_ms: start.elapsed().as_millis() as u64,
                    });

                    let repaired = react::repair(block, question);
                    scratchpad.push_str(repaired.trim());
                    scratchpad.push_str(&format!("\n{} {}\nThought:", OBSERVATION_STOP, observation));
                    scratchpad.push('\n');
                    last_observation = observation;
                }
            }
        }

        Ok(AgentRetrieval {
            analysis: analysis.unwrap_or(last_observation),
            segments,
            complexity,
            params,
            tool_invocations,
            iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{retriever_for, sample_segments, HashingEmbedder, ScriptedLlm};

    async fn agent(llm: Arc<ScriptedLlm>) -> RetrievalAgent {
        let retriever = Arc::new(retriever_for(sample_segments(), HashingEmbedder::new(64)).await);
        RetrievalAgent::new(llm, retriever, GenerationConfig::default(), 3)
    }

    #[tokio::test]
    async fn test_action_then_final_answer() {
        let llm = Arc::new(ScriptedLlm::new([
            "Thought: 需要检索\nAction: law_retrieval\nAction Input: {\"query\": \"劳动合同解除\", \"k\": 2, \"min_score\": -1.0}",
            "Thought: 已找到\nFinal Answer: 第二十五条和第三十一条相关",
        ]));
        let agent = agent(llm.clone()).await;
        let out = agent.run("劳动合同怎么解除？", "暂无对话历史").await.unwrap();

        assert_eq!(out.analysis, "第二十五条和第三十一条相关");
        assert_eq!(out.segments.len(), 2);
        assert_eq!(out.tool_invocations.len(), 1);
        assert_eq!(out.iterations, 2);
        assert!(llm.prompts()[1].contains("Observation:"));
        assert!(llm.prompts()[1].contains("【检索结果 1】"));
    }

    #[tokio::test]
    async fn test_default_params_follow_adaptive_tier() {
        let retriever = Arc::new(retriever_for(sample_segments(), HashingEmbedder::new(64)).await);
        let llm = Arc::new(ScriptedLlm::new(["Final Answer: 无需检索"]));
        let agent = RetrievalAgent::new(llm.clone(), retriever.clone(), GenerationConfig::default(), 3);

        let question = "什么是合同？";
        let out = agent.run(question, "").await.unwrap();
        let adaptive = retriever.retrieve_adaptive(question).await.unwrap();
        assert_eq!((out.complexity, out.params), (adaptive.complexity, adaptive.params));
        assert_eq!(out.params, RetrievalParams::new(3, 0.4));
        assert!(llm.prompts()[0].contains("检索参数：k=3, min_score=0.4"));
    }

    #[tokio::test]
    async fn test_thought_only_is_repaired() {
        let llm = Arc::new(ScriptedLlm::new([
            "Thought: 我需要检索相关法律条文",
            "Final Answer: 完成",
        ]));
        let agent = agent(llm).await;
        let out = agent.run("合同", "").await.unwrap();
        assert_eq!(out.tool_invocations.len(), 1);
        assert_eq!(out.tool_invocations[0].tool_name, "law_retrieval");
        assert_eq!(out.analysis, "完成");
    }

    #[tokio::test]
    async fn test_unrepairable_output_is_malformed() {
        let llm = Arc::new(ScriptedLlm::new(["我不知道该怎么做"]));
        let agent = agent(llm).await;
        assert!(matches!(
            agent.run("合同", "").await,
            Err(QaError::MalformedAgentOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_iterations_exhausted_returns_last_observation() {
        let action = "Thought: 检索\nAction: law_retrieval\nAction Input: {\"query\": \"合同\", \"k\": 1, \"min_score\": -1.0}";
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()).with_fallback(action));
        let agent = agent(llm.clone()).await;
        let out = agent.run("合同", "").await.unwrap();
        assert_eq!(llm.calls(), 3);
        assert_eq!(out.iterations, 3);
        assert!(out.analysis.contains("【检索结果 1】"));
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_in_observation() {
        let llm = Arc::new(ScriptedLlm::new([
            "Thought: x\nAction: web_search\nAction Input: {}",
            "Final Answer: 无",
        ]));
        let agent = agent(llm.clone()).await;
        let out = agent.run("合同", "").await.unwrap();
        assert!(out.segments.is_empty());
        assert!(llm.prompts()[1].contains("web_search 不是可用的工具"));
    }

    #[tokio::test]
    async fn test_llm_failure_maps_to_language_model_error() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let agent = agent(llm).await;
        assert!(matches!(
            agent.run("合同", "").await,
            Err(QaError::LanguageModel(_))
        ));
    }
}
