//! Stage Coordinator
//!
//! Runs one question through `Retrieving → Answering → PersistingMemory` as
//! an explicit state machine. A failing stage moves the run to `Failed` and
//! no later stage executes. The retrieval stage re-invokes the agent on
//! malformed output and falls back to a direct index query when retries run
//! out or the agent exceeds its time limit.
//!
//! Errors never leave this module: every public operation returns a result
//! record with a success flag.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::metrics::{ExecutionStats, StageKind, StageMetrics};
use super::qa::{follow_up_excerpt, is_follow_up, AnswerStyle, QaAgent, QuestionType};
use super::retrieval::RetrievalAgent;
use super::summary::{AnalysisType, SummaryAgent};
use crate::config::QaConfig;
use crate::embeddings::RemoteEmbeddings;
use crate::error::{QaError, QaResult};
use crate::llm::{ChatCompletionsClient, GenerationConfig, LanguageModel};
use crate::memory::{ChatMessage, LlmSummarizer, SessionMemory, SessionSummary};
use crate::search::{
    classify_query, format_results, LawRetriever, QueryComplexity, RetrievalInsights,
    RetrievalParams,
};
use crate::types::{AgentResult, AgentTask, LegalSegment, TaskType};

pub const FAILURE_ANSWER: &str = "抱歉，处理您的问题时出现了错误，请稍后重试。";

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Retrieving,
    Answering,
    PersistingMemory,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    RequestReceived,
    StageSucceeded,
    StageFailed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Next state, or `None` if `event` is not valid in this state.
    pub fn next(self, event: StageEvent) -> Option<PipelineState> {
        use PipelineState::*;
        match (self, event) {
            (Idle, StageEvent::RequestReceived) => Some(Retrieving),
            (Retrieving, StageEvent::StageSucceeded) => Some(Answering),
            (Answering, StageEvent::StageSucceeded) => Some(PersistingMemory),
            (PersistingMemory, StageEvent::StageSucceeded) => Some(Done),
            (s, StageEvent::StageFailed) if !s.is_terminal() => Some(Failed),
            _ => None,
        }
    }
}

/// Current state plus every state visited.
struct PipelineRun {
    state: PipelineState,
    trace: Vec<PipelineState>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            trace: vec![PipelineState::Idle],
        }
    }

    fn advance(&mut self, event: StageEvent) {
        match self.state.next(event) {
            Some(next) => {
                self.state = next;
                self.trace.push(next);
            }
            None => tracing::warn!(state = ?self.state, event = ?event, "Ignoring invalid transition"),
        }
    }
}

// ============================================================================
// Request / response records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaRequest {
    pub question: String,
    #[serde(default)]
    pub answer_style: AnswerStyle,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl QaRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer_style: AnswerStyle::default(),
            session_id: None,
        }
    }

    pub fn with_style(mut self, style: AnswerStyle) -> Self {
        self.answer_style = style;
        self
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalInfo {
    pub documents_found: usize,
    pub complexity: Option<QueryComplexity>,
    pub params: Option<RetrievalParams>,
    pub agent_analysis: String,
    pub documents: Vec<LegalSegment>,
    /// Set when the agent path was abandoned for a direct index query.
    pub fallback: bool,
    pub attempts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaInfo {
    pub question_type: QuestionType,
    pub follow_up: bool,
    /// Whether the previous turn was added to the legal context.
    pub context_used: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTiming {
    pub retrieval_ms: u64,
    pub qa_ms: u64,
    pub memory_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResponse {
    pub success: bool,
    pub task_id: String,
    pub question: String,
    pub answer: String,
    pub answer_style: AnswerStyle,
    pub retrieval_info: RetrievalInfo,
    pub qa_info: Option<QaInfo>,
    pub timing: StageTiming,
    pub session_id: Option<String>,
    pub stage_trace: Vec<PipelineState>,
    pub error: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub total_time_ms: u64,
    pub average_time_ms: f64,
    pub results: Vec<QaResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub stats: ExecutionStats,
    pub current_session: String,
    pub session_count: usize,
    pub indexed_segments: usize,
    pub model: String,
    pub retrieval: RetrievalInsights,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Collaborators the coordinator is composed from.
pub struct CoordinatorParts {
    pub config: QaConfig,
    pub retriever: Arc<LawRetriever>,
    pub llm: Arc<dyn LanguageModel>,
    pub memory: Arc<SessionMemory>,
}

pub struct StageCoordinator {
    config: QaConfig,
    retriever: Arc<LawRetriever>,
    llm: Arc<dyn LanguageModel>,
    memory: Arc<SessionMemory>,
    retrieval_agent: RetrievalAgent,
    qa_agent: QaAgent,
    summary_agent: SummaryAgent,
    metrics: StageMetrics,
}

impl StageCoordinator {
    pub fn new(parts: CoordinatorParts) -> Self {
        let CoordinatorParts {
            config,
            retriever,
            llm,
            memory,
        } = parts;
        let generation = GenerationConfig::from(&config.llm);

        let retrieval_agent = RetrievalAgent::new(
            llm.clone(),
            retriever.clone(),
            generation.clone(),
            config.coordinator.agent_max_iterations,
        );
        let qa_agent = QaAgent::new(llm.clone(), generation.clone());
        let summary_agent =
            SummaryAgent::new(llm.clone(), generation, config.coordinator.summary_max_chars);

        Self {
            config,
            retriever,
            llm,
            memory,
            retrieval_agent,
            qa_agent,
            summary_agent,
            metrics: StageMetrics::new(),
        }
    }

    /// Wire the HTTP embedding and chat clients to the persisted index.
    pub fn open(config: QaConfig) -> QaResult<Self> {
        config.validate().map_err(QaError::InvalidRequest)?;

        let embedder = RemoteEmbeddings::new(&config.embedding)
            .map_err(|e| QaError::EmbeddingService(e.to_string()))?;
        let retriever = Arc::new(LawRetriever::open(&config, Arc::new(embedder))?);
        let llm: Arc<dyn LanguageModel> = Arc::new(
            ChatCompletionsClient::new(&config.llm)
                .map_err(|e| QaError::LanguageModel(e.to_string()))?,
        );
        let summarizer = LlmSummarizer::new(llm.clone(), GenerationConfig::from(&config.llm));
        let memory = Arc::new(SessionMemory::new(config.memory.clone(), Arc::new(summarizer)));

        tracing::info!(
            segments = retriever.len(),
            model = %llm.model_name(),
            "Stage coordinator ready"
        );
        Ok(Self::new(CoordinatorParts {
            config,
            retriever,
            llm,
            memory,
        }))
    }

    pub fn retriever(&self) -> &Arc<LawRetriever> {
        &self.retriever
    }

    pub fn memory(&self) -> &Arc<SessionMemory> {
        &self.memory
    }

    pub fn stats(&self) -> ExecutionStats {
        self.metrics.snapshot()
    }

    // ── Question pipeline ──────────────────────────────────────────────

    pub async fn process_question(&self, request: QaRequest) -> QaResponse {
        let started = Instant::now();
        let task = AgentTask::new(TaskType::Qa, json!(request));
        let mut run = PipelineRun::new();
        let mut response = QaResponse {
            success: false,
            task_id: task.task_id.clone(),
            question: request.question.clone(),
            answer: String::new(),
            answer_style: request.answer_style,
            retrieval_info: RetrievalInfo::default(),
            qa_info: None,
            timing: StageTiming::default(),
            session_id: None,
            stage_trace: Vec::new(),
            error: None,
            details: None,
        };

        let outcome = self.run_pipeline(&request, &mut run, &mut response).await;
        if let Err(e) = outcome {
            run.advance(StageEvent::StageFailed);
            tracing::warn!(
                task_id = %task.task_id,
                kind = e.kind(),
                error = %e,
                "Question pipeline failed"
            );
            response.answer = FAILURE_ANSWER.to_string();
            response.error = Some(e.kind().to_string());
            response.details = Some(e.to_string());
        } else {
            response.success = true;
        }

        response.stage_trace = run.trace;
        response.timing.total_ms = started.elapsed().as_millis() as u64;
        self.metrics
            .record(StageKind::Pipeline, response.success, response.timing.total_ms);
        tracing::info!(
            task_id = %response.task_id,
            success = response.success,
            total_ms = response.timing.total_ms,
            "Question processed"
        );
        response
    }

    async fn run_pipeline(
        &self,
        request: &QaRequest,
        run: &mut PipelineRun,
        response: &mut QaResponse,
    ) -> QaResult<()> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(QaError::InvalidRequest("question is empty".into()));
        }
        let session_id = self.resolve_session(request.session_id.as_deref())?;
        response.session_id = Some(session_id.clone());
        run.advance(StageEvent::RequestReceived);

        let chat_history = self
            .memory
            .format_history_for_context(&session_id, self.config.memory.context_messages)
            .await;

        // Retrieving
        let stage_start = Instant::now();
        let retrieved = self.retrieval_stage(question, &chat_history).await;
        response.timing.retrieval_ms = stage_start.elapsed().as_millis() as u64;
        self.metrics
            .record(StageKind::Retrieval, retrieved.is_ok(), response.timing.retrieval_ms);
        response.retrieval_info = retrieved?;
        run.advance(StageEvent::StageSucceeded);

        // Answering
        let stage_start = Instant::now();
        let follow_up = is_follow_up(question);
        let mut legal_context = format_results(&response.retrieval_info.documents);
        let mut context_used = false;
        if follow_up {
            if let Some((prev_q, prev_a)) = self.memory.last_exchange(&session_id).await {
                legal_context.push_str(&follow_up_excerpt(
                    &prev_q,
                    &prev_a,
                    self.config.coordinator.follow_up_excerpt_chars,
                ));
                context_used = true;
            }
        }
        response.qa_info = Some(QaInfo {
            question_type: QuestionType::classify(question),
            follow_up,
            context_used,
        });
        let answered = self
            .qa_agent
            .answer(question, &legal_context, &chat_history, request.answer_style)
            .await;
        response.timing.qa_ms = stage_start.elapsed().as_millis() as u64;
        self.metrics
            .record(StageKind::Qa, answered.is_ok(), response.timing.qa_ms);
        response.answer = answered?;
        run.advance(StageEvent::StageSucceeded);

        // PersistingMemory
        let stage_start = Instant::now();
        let stored = self
            .memory
            .add_message(&session_id, question, &response.answer)
            .await;
        response.timing.memory_ms = stage_start.elapsed().as_millis() as u64;
        self.metrics
            .record(StageKind::Memory, stored, response.timing.memory_ms);
        if !stored {
            return Err(QaError::SessionNotFound(session_id));
        }
        run.advance(StageEvent::StageSucceeded);
        Ok(())
    }

    fn resolve_session(&self, requested: Option<&str>) -> QaResult<String> {
        match requested {
            Some(id) if self.memory.contains(id) => Ok(id.to_string()),
            Some(id) => Err(QaError::SessionNotFound(id.to_string())),
            None => Ok(self.memory.current_session_id()),
        }
    }

    async fn retrieval_stage(&self, question: &str, chat_history: &str) -> QaResult<RetrievalInfo> {
        let limit = Duration::from_secs(self.config.coordinator.agent_timeout_secs);
        let max_attempts = self.config.coordinator.max_format_retries + 1;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            match tokio::time::timeout(limit, self.retrieval_agent.run(question, chat_history)).await {
                Ok(Ok(agent)) => {
                    tracing::debug!(
                        attempts,
                        documents = agent.segments.len(),
                        "Retrieval agent finished"
                    );
                    return Ok(RetrievalInfo {
                        documents_found: agent.segments.len(),
                        complexity: Some(agent.complexity),
                        params: Some(agent.params),
                        agent_analysis: agent.analysis,
                        documents: agent.segments,
                        fallback: false,
                        attempts,
                    });
                }
                Ok(Err(e)) if e.is_format_error() => {
                    tracing::warn!(attempt = attempts, max_attempts, error = %e, "Retrying retrieval agent");
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = limit.as_secs(),
                        "Retrieval agent timed out"
                    );
                    break;
                }
            }
        }

        self.direct_retrieval(question, attempts).await
    }

    async fn direct_retrieval(&self, question: &str, attempts: usize) -> QaResult<RetrievalInfo> {
        let params = RetrievalParams::new(
            self.config.retrieval.fallback_k,
            self.config.retrieval.fallback_min_score,
        );
        tracing::warn!(k = params.k, min_score = params.min_score, "Falling back to direct retrieval");
        let documents = self
            .retriever
            .retrieve(question, params.k, params.min_score)
            .await?;
        Ok(RetrievalInfo {
            documents_found: documents.len(),
            complexity: Some(classify_query(question)),
            params: Some(params),
            agent_analysis: format_results(&documents),
            documents,
            fallback: true,
            attempts,
        })
    }

    /// Process questions one after another, pausing `batch_delay_ms` after each.
    pub async fn batch_process(&self, questions: &[String], style: AnswerStyle) -> BatchReport {
        let started = Instant::now();
        let delay = Duration::from_millis(self.config.coordinator.batch_delay_ms);
        let mut results = Vec::with_capacity(questions.len());

        for (i, question) in questions.iter().enumerate() {
            tracing::info!(index = i + 1, total = questions.len(), "Processing batch question");
            let response = self
                .process_question(QaRequest::new(question.clone()).with_style(style))
                .await;
            results.push(response);
            tokio::time::sleep(delay).await;
        }

        let total = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let total_time_ms = started.elapsed().as_millis() as u64;
        BatchReport {
            total,
            successful,
            failed: total - successful,
            success_rate: if total == 0 { 0.0 } else { successful as f64 / total as f64 },
            total_time_ms,
            average_time_ms: if total == 0 { 0.0 } else { total_time_ms as f64 / total as f64 },
            results,
        }
    }

    /// Direct index query; missing parameters come from the retrieval defaults.
    pub async fn search_laws(
        &self,
        query: &str,
        k: Option<usize>,
        min_score: Option<f32>,
    ) -> QaResult<Vec<LegalSegment>> {
        let k = k.unwrap_or(self.config.retrieval.default_k);
        let min_score = min_score.unwrap_or(self.config.retrieval.default_min_score);
        self.retriever.retrieve(query, k, min_score).await
    }

    // ── Summary tasks ──────────────────────────────────────────────────

    pub async fn summarize_conversation(&self, session_id: Option<&str>) -> AgentResult {
        let task = AgentTask::new(TaskType::Summary, json!({ "session_id": session_id }));
        let started = Instant::now();

        let outcome = async {
            let id = self.resolve_session(session_id)?;
            let history = self.memory.get_history(&id).await;
            let summary = self.summary_agent.summarize_conversation(&history).await?;
            Ok::<_, QaError>(json!({
                "session_id": id,
                "summary": summary,
                "message_count": history.len(),
            }))
        }
        .await;

        self.finish(&task, StageKind::Summary, started, outcome)
    }

    pub async fn analyze_legal_content(&self, content: &str, analysis_type: AnalysisType) -> AgentResult {
        let task = AgentTask::new(
            TaskType::Analysis,
            json!({ "content": content, "analysis_type": analysis_type }),
        );
        let started = Instant::now();

        let outcome = self
            .summary_agent
            .analyze(content, analysis_type)
            .await
            .map(|analysis| json!({ "analysis_type": analysis_type, "analysis": analysis }));

        self.finish(&task, StageKind::Summary, started, outcome)
    }

    /// Session-insight analysis over a session's statistics and transcript.
    pub async fn session_insights(&self, session_id: Option<&str>) -> AgentResult {
        let task = AgentTask::new(TaskType::Analysis, json!({ "session_id": session_id }));
        let started = Instant::now();

        let outcome = async {
            let id = self.resolve_session(session_id)?;
            let stats = self
                .memory
                .session_stats(&id)
                .await
                .ok_or_else(|| QaError::SessionNotFound(id.clone()))?;
            if stats.total_exchanges == 0 {
                return Err(QaError::InvalidRequest("会话中没有可分析的对话".into()));
            }
            let transcript = crate::memory::render_transcript(&self.memory.get_history(&id).await);
            let content = format!("{}\n\n{}", serde_json::to_string_pretty(&stats)?, transcript);
            let insights = self
                .summary_agent
                .analyze(&content, AnalysisType::SessionInsights)
                .await?;
            Ok::<_, QaError>(json!({ "session_id": id, "stats": stats, "insights": insights }))
        }
        .await;

        self.finish(&task, StageKind::Summary, started, outcome)
    }

    fn finish(
        &self,
        task: &AgentTask,
        kind: StageKind,
        started: Instant,
        outcome: QaResult<serde_json::Value>,
    ) -> AgentResult {
        let elapsed = started.elapsed().as_millis() as u64;
        self.metrics.record(kind, outcome.is_ok(), elapsed);
        match outcome {
            Ok(data) => AgentResult::ok(task, data, elapsed),
            Err(e) => {
                tracing::warn!(task_id = %task.task_id, error = %e, "Task failed");
                AgentResult::failed(task, e.to_string(), elapsed)
                    .with_metadata("error_kind", json!(e.kind()))
            }
        }
    }

    // ── Sessions ───────────────────────────────────────────────────────

    pub fn create_session(&self, title: &str) -> String {
        self.memory.create_session(title)
    }

    pub fn switch_session(&self, session_id: &str) -> bool {
        self.memory.switch_session(session_id)
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        self.memory.list_sessions().await
    }

    /// `None` for an unknown session.
    pub async fn session_messages(&self, session_id: &str) -> Option<Vec<ChatMessage>> {
        if !self.memory.contains(session_id) {
            return None;
        }
        Some(self.memory.get_history(session_id).await)
    }

    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.memory.clear(session_id).await
    }

    pub fn delete_session(&self, session_id: &str) -> bool {
        self.memory.delete_session(session_id)
    }

    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            stats: self.metrics.snapshot(),
            current_session: self.memory.current_session_id(),
            session_count: self.memory.session_count(),
            indexed_segments: self.retriever.len(),
            model: self.llm.model_name().to_string(),
            retrieval: self.retriever.insights(),
        }
    }
}
