use regex::Regex;
use std::sync::LazyLock;

use crate::types::LegalSegment;

// Markers are anchored at the line start; numerals are Chinese or Arabic.
static CHAPTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^第(?:[一二三四五六七八九十百千万零○〇]+|\d+)\s*章").expect("chapter regex is valid")
});
static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^第(?:[一二三四五六七八九十百千万零○〇]+|\d+)\s*节").expect("section regex is valid")
});
static ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^第(?:[一二三四五六七八九十百千万零○〇]+|\d+)\s*条").expect("article regex is valid")
});

/// Splits statute text into article-level [`LegalSegment`]s.
#[derive(Debug, Default, Clone)]
pub struct StatuteSegmenter;

/// Running state while walking the lines of one law.
struct SegmentState<'a> {
    law_name: &'a str,
    title: String,
    chapter: String,
    section: String,
    article: String,
    content: Vec<&'a str>,
    segments: Vec<LegalSegment>,
}

impl<'a> SegmentState<'a> {
    fn new(law_name: &'a str, title: String) -> Self {
        Self {
            law_name,
            title,
            chapter: String::new(),
            section: String::new(),
            article: String::new(),
            content: Vec::new(),
            segments: Vec::new(),
        }
    }

    /// Emit the open article if it has content. Pure append.
    fn flush(&mut self) {
        if self.article.is_empty() || self.content.is_empty() {
            return;
        }
        let content = self.content.join("\n").trim().to_string();
        self.content.clear();
        if content.is_empty() {
            return;
        }
        self.segments.push(LegalSegment {
            law_name: self.law_name.to_string(),
            title: self.title.clone(),
            chapter: self.chapter.clone(),
            section: self.section.clone(),
            article: std::mem::take(&mut self.article),
            content,
            similarity_score: None,
        });
    }

    fn is_open(&self) -> bool {
        !self.article.is_empty() || !self.chapter.is_empty()
    }
}

impl StatuteSegmenter {
    pub fn new() -> Self {
        Self
    }

    /// Segment one law. `law_name` doubles as the title when the text has no
    /// non-empty line.
    pub fn segment(&self, text: &str, law_name: &str) -> Vec<LegalSegment> {
        let title = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or(law_name)
            .to_string();

        let mut state = SegmentState::new(law_name, title);

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if CHAPTER_RE.is_match(line) {
                state.flush();
                state.article.clear();
                state.chapter = line.to_string();
                state.section.clear();
                continue;
            }

            if SECTION_RE.is_match(line) {
                state.flush();
                state.article.clear();
                state.section = line.to_string();
                continue;
            }

            if let Some(marker) = ARTICLE_RE.find(line) {
                state.flush();
                state.article = marker.as_str().to_string();
                let rest = line[marker.end()..].trim();
                if !rest.is_empty() {
                    state.content.push(rest);
                }
                continue;
            }

            if state.is_open() {
                state.content.push(line);
            }
        }

        state.flush();

        tracing::debug!(
            law = %law_name,
            segments = state.segments.len(),
            "Segmented statute text"
        );
        state.segments
    }
}
