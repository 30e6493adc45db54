use serde::{Deserialize, Serialize};

use crate::config::ComplexityTiers;

/// Legal terminology counted toward query complexity.
pub const LEGAL_KEYWORDS: [&str; 7] = ["法律", "条文", "规定", "法规", "责任", "义务", "权利"];

/// `k` / `min_score` pair for one retrieval call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalParams {
    pub k: usize,
    pub min_score: f32,
}

impl RetrievalParams {
    pub fn new(k: usize, min_score: f32) -> Self {
        Self { k, min_score }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.k == 0 {
            return Err("k must be >= 1".into());
        }
        if !(-1.0..=1.0).contains(&self.min_score) {
            return Err(format!("min_score {} outside [-1.0, 1.0]", self.min_score));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
}

impl QueryComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryComplexity::Simple => "simple",
            QueryComplexity::Moderate => "moderate",
            QueryComplexity::Complex => "complex",
        }
    }

    /// Tier parameters for this complexity level.
    pub fn params(&self, tiers: &ComplexityTiers) -> RetrievalParams {
        match self {
            QueryComplexity::Simple => tiers.simple,
            QueryComplexity::Moderate => tiers.moderate,
            QueryComplexity::Complex => tiers.complex,
        }
    }
}

impl std::fmt::Display for QueryComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Surface features of a raw query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexitySignals {
    pub token_count: usize,
    pub question_marks: usize,
    pub keyword_hits: usize,
}

impl ComplexitySignals {
    pub fn from_query(query: &str) -> Self {
        Self {
            token_count: query.split_whitespace().count(),
            question_marks: query.chars().filter(|c| *c == '？' || *c == '?').count(),
            keyword_hits: LEGAL_KEYWORDS.iter().filter(|kw| query.contains(*kw)).count(),
        }
    }

    pub fn classify(&self) -> QueryComplexity {
        if self.token_count <= 10 && self.question_marks <= 1 && self.keyword_hits <= 2 {
            QueryComplexity::Simple
        } else if self.token_count <= 20 && self.keyword_hits <= 4 {
            QueryComplexity::Moderate
        } else {
            QueryComplexity::Complex
        }
    }
}

/// Classify a raw (unsanitized) query.
pub fn classify_query(query: &str) -> QueryComplexity {
    ComplexitySignals::from_query(query).classify()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QaConfig;
    use proptest::prelude::*;

    #[test]
    fn test_short_question_is_simple() {
        assert_eq!(classify_query("合同无效的情形？"), QueryComplexity::Simple);
    }

    #[test]
    fn test_many_tokens_and_keywords_is_complex() {
        let mut words: Vec<&str> = vec!["法律", "条文", "规定", "法规", "责任"];
        words.extend(std::iter::repeat("词").take(20));
        let query = words.join(" ");

        let signals = ComplexitySignals::from_query(&query);
        assert_eq!(signals.token_count, 25);
        assert_eq!(signals.keyword_hits, 5);
        assert_eq!(signals.classify(), QueryComplexity::Complex);

        let tiers = QaConfig::default().retrieval.tiers;
        assert_eq!(
            signals.classify().params(&tiers),
            RetrievalParams::new(8, 0.25)
        );
    }

    #[test]
    fn test_two_question_marks_is_moderate() {
        let signals = ComplexitySignals::from_query("什么是合同？如何解除？");
        assert_eq!(signals.question_marks, 2);
        assert_eq!(signals.classify(), QueryComplexity::Moderate);
    }

    #[test]
    fn test_keyword_hits_count_distinct_terms() {
        let signals = ComplexitySignals::from_query("责任 责任 责任 义务");
        assert_eq!(signals.keyword_hits, 2);
    }

    #[test]
    fn test_params_validation() {
        assert!(RetrievalParams::new(0, 0.3).validate().is_err());
        assert!(RetrievalParams::new(3, -1.5).validate().is_err());
        assert!(RetrievalParams::new(3, 1.0).validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_classify_depends_only_on_signals(
            tokens in 0usize..40,
            marks in 0usize..6,
            hits in 0usize..8,
        ) {
            let signals = ComplexitySignals {
                token_count: tokens,
                question_marks: marks,
                keyword_hits: hits,
            };
            let first = signals.classify();
            prop_assert_eq!(first, signals.classify());
            if tokens > 20 || hits > 4 {
                prop_assert_eq!(first, QueryComplexity::Complex);
            }
        }
    }
}
