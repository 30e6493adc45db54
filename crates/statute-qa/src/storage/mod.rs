pub mod metadata;
pub mod vector_index;

use std::path::Path;

use crate::error::{QaError, QaResult};
use crate::types::LegalSegment;

pub use vector_index::EmbeddingIndex;

/// Write the index and its positionally paired metadata.
pub fn persist(
    index: &EmbeddingIndex,
    segments: &[LegalSegment],
    index_path: &Path,
    metadata_path: &Path,
) -> QaResult<()> {
    if index.len() != segments.len() {
        return Err(QaError::InvalidRequest(format!(
            "index has {} vectors but {} segments were given",
            index.len(),
            segments.len()
        )));
    }

    index.write_to(index_path)?;
    metadata::write_metadata(metadata_path, segments)?;

    tracing::info!(
        vectors = index.len(),
        dimension = index.dimension(),
        index = %index_path.display(),
        metadata = %metadata_path.display(),
        "Persisted statute index"
    );
    Ok(())
}

/// Load both artifacts; any missing or inconsistent file is `IndexUnavailable`.
pub fn load(index_path: &Path, metadata_path: &Path) -> QaResult<(EmbeddingIndex, Vec<LegalSegment>)> {
    let index = EmbeddingIndex::read_from(index_path)?;
    let segments = metadata::read_metadata(metadata_path)?;

    if index.len() != segments.len() {
        return Err(QaError::IndexUnavailable(format!(
            "index has {} vectors but metadata has {} segments",
            index.len(),
            segments.len()
        )));
    }

    tracing::info!(
        vectors = index.len(),
        dimension = index.dimension(),
        "Loaded statute index"
    );
    Ok((index, segments))
}
