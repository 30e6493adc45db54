use std::path::Path;
use walkdir::WalkDir;

use super::segmenter::StatuteSegmenter;
use crate::error::{QaError, QaResult};
use crate::types::{LawDocument, LegalSegment};

/// Read every `.txt` statute under `dir`, in sorted path order.
///
/// Unreadable files are logged and skipped; a missing directory or one
/// without any statute file is an error.
pub fn load_corpus(dir: &Path) -> QaResult<Vec<LawDocument>> {
    if !dir.is_dir() {
        return Err(QaError::InvalidRequest(format!(
            "Corpus directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<_> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("txt"))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let law_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                tracing::info!(law = %law_name, bytes = text.len(), "Read statute file");
                documents.push(LawDocument { law_name, text });
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable statute file");
            }
        }
    }

    if documents.is_empty() {
        return Err(QaError::InvalidRequest(format!(
            "No statute files found in {}",
            dir.display()
        )));
    }
    Ok(documents)
}

/// Segment every document, preserving corpus order.
pub fn segment_corpus(documents: &[LawDocument]) -> Vec<LegalSegment> {
    let segmenter = StatuteSegmenter::new();
    let mut all = Vec::new();
    for doc in documents {
        let segments = segmenter.segment(&doc.text, &doc.law_name);
        tracing::info!(law = %doc.law_name, segments = segments.len(), "Segmented law");
        all.extend(segments);
    }
    tracing::info!(total = all.len(), laws = documents.len(), "Corpus segmentation complete");
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_corpus_reads_txt_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_劳动法.txt"), "劳动法\n第一条 劳动者权利").unwrap();
        std::fs::write(dir.path().join("a_公司法.txt"), "公司法\n第一条 公司设立").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let docs = load_corpus(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].law_name, "a_公司法.txt");

        let segments = segment_corpus(&docs);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].title, "公司法");
        assert_eq!(segments[1].law_name, "b_劳动法.txt");
    }

    #[test]
    fn test_empty_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_corpus(dir.path()),
            Err(QaError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_corpus(&dir.path().join("nope")).is_err());
    }
}
