//! Agent Tools - tools the retrieval agent can call by name

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::react::RETRIEVAL_TOOL;
use crate::error::QaResult;
use crate::search::{clean_query, format_results, LawRetriever, RetrievalParams};
use crate::types::{char_prefix, LegalSegment};

/// Per-call context handed to a tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext {
    /// Parameters used when the tool input does not carry its own.
    pub default_params: RetrievalParams,
}

/// Result from tool execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Observation text fed back to the agent
    pub output: String,

    /// Segments found, if the tool retrieves
    pub segments: Vec<LegalSegment>,
}

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Run the tool on the raw `Action Input:` text.
    async fn execute(&self, input: &str, ctx: &ToolContext) -> QaResult<ToolOutput>;
}

/// Parsed `law_retrieval` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalArgs {
    pub query: String,
    pub params: RetrievalParams,
}

impl RetrievalArgs {
    /// Accepts a JSON object or any of the malformed shapes [`clean_query`]
    /// understands. Out-of-range `k` / `min_score` fall back to `defaults`.
    pub fn parse(input: &str, defaults: RetrievalParams) -> Self {
        let query = clean_query(input);

        let json: Option<serde_json::Value> = serde_json::from_str(input.trim()).ok();
        let k = json
            .as_ref()
            .and_then(|v| v.get("k"))
            .and_then(|v| v.as_u64())
            .map(|k| k as usize)
            .unwrap_or(defaults.k);
        let min_score = json
            .as_ref()
            .and_then(|v| v.get("min_score"))
            .and_then(|v| v.as_f64())
            .map(|s| s as f32)
            .unwrap_or(defaults.min_score);

        let mut params = RetrievalParams::new(k, min_score);
        if let Err(e) = params.validate() {
            tracing::warn!(error = %e, "Ignoring invalid tool parameters");
            params = defaults;
        }

        Self { query, params }
    }
}

/// Vector search over the statute index.
pub struct LawRetrievalTool {
    retriever: Arc<LawRetriever>,
}

impl LawRetrievalTool {
    pub fn new(retriever: Arc<LawRetriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl AgentTool for LawRetrievalTool {
    fn name(&self) -> &str {
        RETRIEVAL_TOOL
    }

    fn description(&self) -> &str {
        "法律条文检索工具。使用向量相似度搜索找到与查询问题最相关的法律条文。\
         输入为JSON：{\"query\": \"查询内容\", \"k\": 返回数量, \"min_score\": 最小相似度}"
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> QaResult<ToolOutput> {
        let args = RetrievalArgs::parse(input, ctx.default_params);
        let segments = self
            .retriever
            .retrieve(&args.query, args.params.k, args.params.min_score)
            .await?;
        Ok(ToolOutput {
            output: format_results(&segments),
            segments,
        })
    }
}

/// Frames legal content for the model to summarize, extract or advise on.
pub struct ContentAnalysisTool;

#[async_trait]
impl AgentTool for ContentAnalysisTool {
    fn name(&self) -> &str {
        "content_analysis"
    }

    fn description(&self) -> &str {
        "法律内容分析工具。输入为JSON：{\"content\": \"需要分析的内容\", \
         \"analysis_type\": \"summary|key_points|legal_advice\"}"
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> QaResult<ToolOutput> {
        let json: Option<serde_json::Value> = serde_json::from_str(input.trim()).ok();
        let content = json
            .as_ref()
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or(input)
            .trim();
        let analysis_type = json
            .as_ref()
            .and_then(|v| v.get("analysis_type"))
            .and_then(|v| v.as_str())
            .unwrap_or("summary");

        if content.is_empty() {
            return Ok(ToolOutput {
                output: "内容为空，无法进行分析。".to_string(),
                segments: Vec::new(),
            });
        }

        let heading = match analysis_type {
            "summary" => "【内容总结】\n需要对以下内容进行总结：",
            "key_points" => "【关键要点】\n需要提取以下内容的关键法律要点：",
            "legal_advice" => "【法律建议】\n需要基于以下内容提供法律建议：",
            _ => "【内容分析】\n需要分析以下内容：",
        };
        Ok(ToolOutput {
            output: format!("{}\n{}...", heading, char_prefix(content, 500)),
            segments: Vec::new(),
        })
    }
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the statute retrieval and content analysis tools.
    pub fn with_retriever(retriever: Arc<LawRetriever>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LawRetrievalTool::new(retriever)));
        registry.register(Arc::new(ContentAnalysisTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// `name: description` lines for the agent prompt.
    pub fn describe(&self) -> String {
        self.list()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| format!("{}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{retriever_for, sample_segments, HashingEmbedder};

    fn defaults() -> RetrievalParams {
        RetrievalParams::new(3, 0.4)
    }

    #[test]
    fn test_args_from_json() {
        let args = RetrievalArgs::parse(r#"{"query": "违约责任", "k": 5, "min_score": 0.2}"#, defaults());
        assert_eq!(args.query, "违约责任");
        assert_eq!(args.params, RetrievalParams::new(5, 0.2));
    }

    #[test]
    fn test_args_defaults_for_plain_text() {
        let args = RetrievalArgs::parse("违约责任？", defaults());
        assert_eq!(args.query, "违约责任");
        assert_eq!(args.params, defaults());
    }

    #[test]
    fn test_args_invalid_params_fall_back() {
        let args = RetrievalArgs::parse(r#"{"query": "x", "k": 0}"#, defaults());
        assert_eq!(args.params, defaults());
    }

    #[tokio::test]
    async fn test_retrieval_tool_formats_observation() {
        let retriever = Arc::new(retriever_for(sample_segments(), HashingEmbedder::new(64)).await);
        let registry = ToolRegistry::with_retriever(retriever);
        let tool = registry.get(RETRIEVAL_TOOL).unwrap();
        let ctx = ToolContext {
            default_params: RetrievalParams::new(2, -1.0),
        };

        let out = tool.execute(r#"{"query": "劳动合同"}"#, &ctx).await.unwrap();
        assert_eq!(out.segments.len(), 2);
        assert!(out.output.contains("【检索结果 1】"));
        assert!(out.output.contains("【检索结果 2】"));
    }

    #[tokio::test]
    async fn test_content_analysis_tool() {
        let ctx = ToolContext {
            default_params: defaults(),
        };
        let out = ContentAnalysisTool
            .execute(r#"{"content": "第一条 内容", "analysis_type": "key_points"}"#, &ctx)
            .await
            .unwrap();
        assert!(out.output.starts_with("【关键要点】"));

        let empty = ContentAnalysisTool.execute("  ", &ctx).await.unwrap();
        assert_eq!(empty.output, "内容为空，无法进行分析。");
    }

    #[test]
    fn test_registry_lists_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ContentAnalysisTool));
        assert_eq!(registry.list(), vec!["content_analysis".to_string()]);
        assert!(registry.describe().starts_with("content_analysis:"));
    }
}
