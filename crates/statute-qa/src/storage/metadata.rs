use std::path::Path;

use crate::error::{QaError, QaResult};
use crate::types::LegalSegment;

/// Encode segment metadata as MessagePack with named fields.
pub fn encode(segments: &[LegalSegment]) -> QaResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(segments)?)
}

pub fn decode(data: &[u8]) -> QaResult<Vec<LegalSegment>> {
    Ok(rmp_serde::from_slice(data)?)
}

pub fn write_metadata(path: &Path, segments: &[LegalSegment]) -> QaResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode(segments)?)?;
    Ok(())
}

pub fn read_metadata(path: &Path) -> QaResult<Vec<LegalSegment>> {
    let data = std::fs::read(path).map_err(|e| {
        QaError::IndexUnavailable(format!("cannot read {}: {}", path.display(), e))
    })?;
    decode(&data).map_err(|e| QaError::IndexUnavailable(format!("corrupt metadata: {}", e)))
}
