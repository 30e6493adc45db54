//! Query cleanup for text produced by LLM tool calls.
//!
//! Agents frequently pass the whole argument blob (`{"query": .., "k": 3}`,
//! `query="..", k=5`) where a bare query string is expected. These rules peel
//! the actual query out before it is embedded.

use regex::Regex;
use std::sync::LazyLock;

static QUOTED_QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"query\s*=\s*["']([^"']+)["']"#).expect("quoted query regex is valid")
});
static QUERY_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^.*query\s*=\s*["']?"#).expect("query prefix regex is valid")
});
static QUOTE_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["'].*$"#).expect("quote tail regex is valid"));

/// Reduce a raw tool argument to the query text to embed.
pub fn clean_query(raw: &str) -> String {
    let trimmed = raw.trim();

    let mut cleaned = if let Some(q) = extract_json_query(trimmed) {
        tracing::debug!(query = %q, "Extracted query from JSON argument");
        q
    } else if let Some(caps) = QUOTED_QUERY_RE.captures(trimmed) {
        let q = caps[1].to_string();
        tracing::debug!(query = %q, "Extracted query from query=\"...\" argument");
        q
    } else if let Some(q) = extract_multi_param_query(trimmed) {
        tracing::debug!(query = %q, "Extracted query from multi-parameter argument");
        q
    } else {
        trimmed.to_string()
    };

    if let Some(stripped) = cleaned
        .strip_suffix('？')
        .or_else(|| cleaned.strip_suffix('?'))
    {
        cleaned = stripped.to_string();
    }

    if let Some((first, _)) = cleaned.split_once('\n') {
        cleaned = first.trim().to_string();
    }

    cleaned
}

fn extract_json_query(text: &str) -> Option<String> {
    if !(text.starts_with('{') && text.ends_with('}')) {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    match value.get("query")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn extract_multi_param_query(text: &str) -> Option<String> {
    if !(text.contains("query=") && (text.contains("k=") || text.contains("min_score="))) {
        return None;
    }
    text.split(',')
        .filter(|part| part.contains("query="))
        .map(|part| {
            let without_prefix = QUERY_PREFIX_RE.replace(part.trim(), "");
            QUOTE_TAIL_RE.replace(&without_prefix, "").trim().to_string()
        })
        .find(|q| !q.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_argument() {
        assert_eq!(clean_query(r#"{"query": "合同效力", "k": 3}"#), "合同效力");
    }

    #[test]
    fn test_invalid_json_left_alone() {
        assert_eq!(clean_query("{not json}"), "{not json}");
    }

    #[test]
    fn test_quoted_query_argument() {
        assert_eq!(clean_query(r#"query="劳动合同解除", k=5"#), "劳动合同解除");
        assert_eq!(clean_query("query='违约责任'"), "违约责任");
    }

    #[test]
    fn test_unquoted_multi_param_argument() {
        assert_eq!(clean_query("query=离婚财产分割, k=5, min_score=0.3"), "离婚财产分割");
    }

    #[test]
    fn test_trailing_question_mark_stripped_once() {
        assert_eq!(clean_query("什么是不可抗力？"), "什么是不可抗力");
        assert_eq!(clean_query("what is tort??"), "what is tort?");
        assert_eq!(clean_query("是否？需要登记"), "是否？需要登记");
    }

    #[test]
    fn test_keeps_first_line_only() {
        assert_eq!(clean_query("租赁合同\nThought: 我需要检索"), "租赁合同");
    }

    #[test]
    fn test_plain_query_trimmed() {
        assert_eq!(clean_query("  物权登记  "), "物权登记");
    }
}
