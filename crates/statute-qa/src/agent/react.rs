//! Thought / Action / Final Answer output handling for the retrieval agent.
//!
//! Local models regularly emit a `Thought:` and then stop, or wrap the tool
//! argument in the wrong syntax. [`validate`] decides whether a block follows
//! the contract, [`repair`] patches the common Thought-only case, and
//! [`parse`] turns a valid block into the next [`AgentStep`].

use serde_json::json;

use crate::error::{QaError, QaResult};

pub const RETRIEVAL_TOOL: &str = "law_retrieval";

const THOUGHT: &str = "Thought:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION: &str = "Observation:";
const FINAL_ANSWER: &str = "Final Answer:";

#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    FinalAnswer(String),
    Action { tool: String, input: String },
}

/// A block is valid if it reaches `Final Answer:` (anywhere on a line, as
/// [`parse`] accepts it), or every `Thought:` is followed by an `Action:`
/// before the next `Thought:`. No thought at all is also valid.
pub fn validate(block: &str) -> bool {
    let mut has_thought = false;
    let mut has_action = false;

    for line in block.trim().lines().map(str::trim) {
        if line.contains(FINAL_ANSWER) {
            return true;
        }
        if line.starts_with(THOUGHT) {
            has_thought = true;
            has_action = false;
        } else if line.starts_with(ACTION) && has_thought {
            has_action = true;
        }
    }

    has_action || !has_thought
}

/// Append a default retrieval action to a Thought-only block.
///
/// Blocks containing `Final Answer:` are returned unchanged.
pub fn repair(block: &str, query: &str) -> String {
    if block.contains(FINAL_ANSWER) {
        return block.to_string();
    }

    let trimmed = block.trim();
    if trimmed.starts_with(THOUGHT) && !trimmed.contains(ACTION) {
        let input = json!({ "query": query, "k": 3, "min_score": 0.4 });
        return format!(
            "{}\n{} {}\n{} {}",
            trimmed, ACTION, RETRIEVAL_TOOL, ACTION_INPUT, input
        );
    }

    block.to_string()
}

/// Parse a block into the next step; whichever of `Action:` and
/// `Final Answer:` appears first wins.
pub fn parse(block: &str) -> QaResult<AgentStep> {
    let final_pos = block.find(FINAL_ANSWER);
    let action_pos = find_line_start(block, ACTION);

    match (action_pos, final_pos) {
        (Some(a), Some(f)) if f < a => Ok(final_answer(block, f)),
        (None, Some(f)) => Ok(final_answer(block, f)),
        (Some(a), _) => parse_action(&block[a..]),
        (None, None) => Err(QaError::MalformedAgentOutput(format!(
            "neither '{}' nor '{}' found in: {}",
            ACTION,
            FINAL_ANSWER,
            preview(block)
        ))),
    }
}

/// Validate, repair once if needed, and parse.
pub fn interpret(block: &str, query: &str) -> QaResult<AgentStep> {
    if validate(block) {
        return parse(block);
    }

    let repaired = repair(block, query);
    if !validate(&repaired) {
        return Err(QaError::MalformedAgentOutput(format!(
            "missing '{}' after '{}': {}",
            ACTION,
            THOUGHT,
            preview(block)
        )));
    }
    tracing::warn!("Repaired Thought-only agent output with default retrieval action");
    parse(&repaired)
}

fn final_answer(block: &str, pos: usize) -> AgentStep {
    AgentStep::FinalAnswer(block[pos + FINAL_ANSWER.len()..].trim().to_string())
}

fn parse_action(from_action: &str) -> QaResult<AgentStep> {
    let mut lines = from_action.lines();
    let tool = lines
        .next()
        .and_then(|l| l.trim().strip_prefix(ACTION))
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    if tool.is_empty() {
        return Err(QaError::MalformedAgentOutput("empty tool name".into()));
    }

    let mut input_lines: Vec<&str> = Vec::new();
    let mut in_input = false;
    for line in lines {
        let t = line.trim();
        if t.starts_with(OBSERVATION) {
            break;
        }
        if let Some(rest) = t.strip_prefix(ACTION_INPUT) {
            in_input = true;
            input_lines.push(rest.trim());
        } else if in_input {
            input_lines.push(t);
        }
    }

    if !in_input {
        return Err(QaError::MalformedAgentOutput(format!(
            "missing '{}' after '{} {}'",
            ACTION_INPUT, ACTION, tool
        )));
    }

    Ok(AgentStep::Action {
        tool,
        input: input_lines.join("\n").trim().to_string(),
    })
}

fn find_line_start(block: &str, marker: &str) -> Option<usize> {
    let mut offset = 0;
    for line in block.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        if line.trim_start().starts_with(marker) {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

fn preview(block: &str) -> String {
    block.chars().take(120).collect()
}
