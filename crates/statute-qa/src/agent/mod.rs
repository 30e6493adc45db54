//! Agent layer: the retrieval, answer and summary agents and the stage
//! coordinator that sequences them.
//!
//! - `react`: validation, repair and parsing of Thought/Action output
//! - `tools`: tools the retrieval agent can call by name
//! - `retrieval`: ReAct loop over the statute index
//! - `qa` / `summary`: single-shot generation agents
//! - `coordinator`: the request state machine, retries and statistics

pub mod coordinator;
pub mod metrics;
pub mod prompts;
pub mod qa;
pub mod react;
pub mod retrieval;
pub mod summary;
pub mod tools;

pub use coordinator::{
    BatchReport, CoordinatorParts, PipelineState, QaInfo, QaRequest, QaResponse, RetrievalInfo,
    StageCoordinator, StageEvent, StageTiming, SystemStatus, FAILURE_ANSWER,
};
pub use metrics::{ExecutionStats, StageKind, StageMetrics, StageStats};
pub use qa::{is_follow_up, AnswerStyle, QaAgent, QuestionType};
pub use react::{AgentStep, RETRIEVAL_TOOL};
pub use retrieval::{AgentRetrieval, RetrievalAgent, ToolInvocation};
pub use summary::{AnalysisType, SummaryAgent};
pub use tools::{AgentTool, ContentAnalysisTool, LawRetrievalTool, ToolContext, ToolOutput, ToolRegistry};
