//! Per-session conversational memory with summarization-based eviction.
//!
//! Every session owns a message log and a running summary. When the log plus
//! summary exceeds the token budget, the oldest messages are folded into the
//! summary. Sessions live in a `DashMap` keyed by id, each behind its own
//! async mutex, so different sessions never contend.

pub mod summarizer;
pub mod types;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::types::{char_prefix, estimate_tokens};

pub use summarizer::{condense, render_transcript, LlmSummarizer, Summarizer};
pub use types::{ChatMessage, ChatSession, Role, SessionStats, SessionSummary};

pub const DEFAULT_SESSION_TITLE: &str = "新对话";
pub const EMPTY_HISTORY_TEXT: &str = "暂无对话历史";

struct SessionState {
    session: ChatSession,
    messages: VecDeque<ChatMessage>,
    summary: String,
}

impl SessionState {
    fn new(id: String, title: &str) -> Self {
        Self {
            session: ChatSession::new(id, title),
            messages: VecDeque::new(),
            summary: String::new(),
        }
    }

    fn token_cost(&self) -> usize {
        self.messages.iter().map(ChatMessage::token_cost).sum::<usize>()
            + estimate_tokens(&self.summary)
    }
}

pub struct SessionMemory {
    sessions: DashMap<String, Arc<Mutex<SessionState>>>,
    current: RwLock<String>,
    summarizer: Arc<dyn Summarizer>,
    config: MemoryConfig,
}

impl SessionMemory {
    /// New store holding one empty default session, which is current.
    pub fn new(config: MemoryConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        let id = Uuid::new_v4().to_string();
        let sessions = DashMap::new();
        sessions.insert(
            id.clone(),
            Arc::new(Mutex::new(SessionState::new(id.clone(), DEFAULT_SESSION_TITLE))),
        );
        tracing::info!(session_id = %id, "Created default session");
        Self {
            sessions,
            current: RwLock::new(id),
            summarizer,
            config,
        }
    }

    fn state(&self, session_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        let state = self.sessions.get(session_id).map(|e| e.value().clone());
        if state.is_none() {
            tracing::warn!(session_id = %session_id, "Session not found");
        }
        state
    }

    fn insert_new(&self, title: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(
            id.clone(),
            Arc::new(Mutex::new(SessionState::new(id.clone(), title))),
        );
        id
    }

    /// Create a session and make it current.
    pub fn create_session(&self, title: &str) -> String {
        let mut current = self.current.write();
        let id = self.insert_new(title);
        *current = id.clone();
        tracing::info!(session_id = %id, title = %title, "Created session");
        id
    }

    pub fn switch_session(&self, session_id: &str) -> bool {
        let mut current = self.current.write();
        if !self.sessions.contains_key(session_id) {
            tracing::warn!(session_id = %session_id, "Cannot switch to unknown session");
            return false;
        }
        *current = session_id.to_string();
        tracing::info!(session_id = %session_id, "Switched session");
        true
    }

    pub fn current_session_id(&self) -> String {
        self.current.read().clone()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Remove a session. Deleting the current session installs a fresh one
    /// under the same lock, so the current id always names a live session.
    pub fn delete_session(&self, session_id: &str) -> bool {
        let mut current = self.current.write();
        if self.sessions.remove(session_id).is_none() {
            tracing::warn!(session_id = %session_id, "Cannot delete unknown session");
            return false;
        }
        tracing::info!(session_id = %session_id, "Deleted session");

        if *current == session_id {
            let replacement = self.insert_new(DEFAULT_SESSION_TITLE);
            tracing::info!(session_id = %replacement, "Created replacement session");
            *current = replacement;
        }
        true
    }

    /// Append one exchange and enforce the token budget.
    pub async fn add_message(&self, session_id: &str, user_text: &str, ai_text: &str) -> bool {
        let Some(state) = self.state(session_id) else {
            return false;
        };
        let mut state = state.lock().await;

        state.messages.push_back(ChatMessage::user(user_text));
        state.messages.push_back(ChatMessage::assistant(ai_text));
        state.session.message_count += 1;
        state.session.updated_at = Utc::now();

        if state.session.message_count == 1 {
            state.session.title = self.title_from(user_text);
        }

        self.enforce_budget(&mut state).await;
        true
    }

    fn title_from(&self, user_text: &str) -> String {
        let prefix = char_prefix(user_text, self.config.title_max_chars);
        if prefix.len() < user_text.len() {
            format!("{}...", prefix)
        } else {
            prefix.to_string()
        }
    }

    /// Folds the oldest exchanges into the summary until the session fits
    /// `max_token_limit`. Retained messages are cut back to half the budget
    /// and the newest exchange always stays. The summary gets the rest and
    /// loses its oldest text first.
    async fn enforce_budget(&self, state: &mut SessionState) {
        let limit = self.config.max_token_limit;
        if state.token_cost() <= limit {
            return;
        }

        let newest = state.messages.len().saturating_sub(2);
        let newest_cost: usize = state
            .messages
            .iter()
            .skip(newest)
            .map(ChatMessage::token_cost)
            .sum();
        if newest_cost > limit {
            let share = limit / 2;
            for msg in state.messages.iter_mut().skip(newest) {
                truncate_to_tokens(&mut msg.content, share);
            }
            tracing::debug!(session_id = %state.session.id, "Clipped oversized exchange to budget");
        }

        let message_budget = limit - limit / 2;
        while state.token_cost() > limit && state.messages.len() > 2 {
            let mut evicted = Vec::new();
            while state.messages.len() > 2 {
                let Some(msg) = state.messages.pop_front() else { break };
                let pairs_with_next = msg.role == Role::User
                    && state.messages.front().is_some_and(|m| m.role == Role::Assistant)
                    && state.messages.len() > 2;
                evicted.push(msg);
                if pairs_with_next {
                    evicted.extend(state.messages.pop_front());
                }
                if message_cost(&state.messages) <= message_budget {
                    break;
                }
            }

            let transcript = render_transcript(&evicted);
            state.summary = match self.summarizer.summarize(&state.summary, &transcript).await {
                Ok(summary) if !summary.trim().is_empty() => summary,
                Ok(_) => condense(&state.summary, &evicted),
                Err(e) => {
                    tracing::warn!(
                        session_id = %state.session.id,
                        error = %e,
                        "Summarizer failed, using rule-based condensation"
                    );
                    condense(&state.summary, &evicted)
                }
            };
            let summary_budget = limit.saturating_sub(message_cost(&state.messages));
            keep_recent_tokens(&mut state.summary, summary_budget);

            tracing::debug!(
                session_id = %state.session.id,
                evicted = evicted.len(),
                retained = state.messages.len(),
                cost = state.token_cost(),
                "Folded messages into summary"
            );
        }

        if state.token_cost() > limit {
            let summary_budget = limit.saturating_sub(message_cost(&state.messages));
            keep_recent_tokens(&mut state.summary, summary_budget);
            tracing::debug!(session_id = %state.session.id, "Clipped session summary to budget");
        }
    }

    pub async fn get_history(&self, session_id: &str) -> Vec<ChatMessage> {
        match self.state(session_id) {
            Some(state) => state.lock().await.messages.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Running summary, `None` when unknown or nothing has been evicted yet.
    pub async fn get_summary(&self, session_id: &str) -> Option<String> {
        let state = self.state(session_id)?;
        let summary = state.lock().await.summary.clone();
        (!summary.is_empty()).then_some(summary)
    }

    /// Empty the log and summary; the session itself stays.
    pub async fn clear(&self, session_id: &str) -> bool {
        let Some(state) = self.state(session_id) else {
            return false;
        };
        let mut state = state.lock().await;
        state.messages.clear();
        state.summary.clear();
        state.session.message_count = 0;
        state.session.updated_at = Utc::now();
        tracing::info!(session_id = %session_id, "Cleared session");
        true
    }

    pub async fn session(&self, session_id: &str) -> Option<ChatSession> {
        let state = self.state(session_id)?;
        let session = state.lock().await.session.clone();
        Some(session)
    }

    /// All sessions, most recently updated first.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let states: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(states.len());
        for state in states {
            let state = state.lock().await;
            out.push(SessionSummary {
                session_id: state.session.id.clone(),
                title: state.session.title.clone(),
                created_at: state.session.created_at,
                updated_at: state.session.updated_at,
                message_count: state.session.message_count,
                context_summary: state.summary.clone(),
            });
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    pub async fn session_stats(&self, session_id: &str) -> Option<SessionStats> {
        let state = self.state(session_id)?;
        let state = state.lock().await;
        let user_messages = state.messages.iter().filter(|m| m.role == Role::User).count();
        Some(SessionStats {
            session_id: state.session.id.clone(),
            title: state.session.title.clone(),
            created_at: state.session.created_at,
            updated_at: state.session.updated_at,
            total_exchanges: state.session.message_count,
            user_messages,
            assistant_messages: state.messages.len() - user_messages,
            has_summary: !state.summary.is_empty(),
            memory_size: state.messages.len(),
            token_cost: state.token_cost(),
        })
    }

    /// Last `max_messages` messages as prompt lines, preceded by the summary if any.
    pub async fn format_history_for_context(&self, session_id: &str, max_messages: usize) -> String {
        let Some(state) = self.state(session_id) else {
            return EMPTY_HISTORY_TEXT.to_string();
        };
        let state = state.lock().await;
        if state.messages.is_empty() && state.summary.is_empty() {
            return EMPTY_HISTORY_TEXT.to_string();
        }

        let mut lines = Vec::new();
        if !state.summary.is_empty() {
            lines.push(format!("对话摘要: {}", state.summary));
        }
        let skip = state.messages.len().saturating_sub(max_messages);
        lines.extend(state.messages.iter().skip(skip).map(ChatMessage::render));
        lines.join("\n")
    }

    /// Most recent user question and the reply that followed it.
    pub async fn last_exchange(&self, session_id: &str) -> Option<(String, String)> {
        let state = self.state(session_id)?;
        let state = state.lock().await;
        let mut iter = state.messages.iter().rev();
        let answer = iter.find(|m| m.role == Role::Assistant)?;
        let question = iter.find(|m| m.role == Role::User)?;
        Some((question.content.clone(), answer.content.clone()))
    }
}

fn message_cost(messages: &VecDeque<ChatMessage>) -> usize {
    messages.iter().map(ChatMessage::token_cost).sum()
}

/// Truncate `text` on a char boundary so its token estimate fits `limit`.
fn truncate_to_tokens(text: &mut String, limit: usize) {
    let max_bytes = limit.saturating_mul(4);
    if text.len() <= max_bytes {
        return;
    }
    let end = text
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= max_bytes)
        .last()
        .unwrap_or(0);
    text.truncate(end);
}

/// Drop the oldest part of `text` until its token estimate fits `limit`.
/// Whole leading lines go first, then characters from the front.
fn keep_recent_tokens(text: &mut String, limit: usize) {
    let max_bytes = limit.saturating_mul(4);
    if text.len() <= max_bytes {
        return;
    }
    let excess = text.len() - max_bytes;
    let line_start = text
        .match_indices('\n')
        .map(|(i, _)| i + 1)
        .find(|i| *i >= excess && *i < text.len());
    let cut = match line_start {
        Some(line_start) => line_start,
        None => text
            .char_indices()
            .map(|(i, _)| i)
            .find(|i| *i >= excess)
            .unwrap_or(text.len()),
    };
    text.drain(..cut);
}
