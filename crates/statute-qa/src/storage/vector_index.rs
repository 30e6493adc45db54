use bytes::{Buf, BufMut, BytesMut};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::path::Path;

use crate::embeddings::l2_normalize;
use crate::error::{QaError, QaResult};

const MAGIC: &[u8; 4] = b"SQIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;
const NORM_TOLERANCE: f32 = 1e-3;

/// Exact inner-product index over unit-norm vectors.
///
/// Row `i` pairs with `metadata[i]`; both are built and persisted together.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingIndex {
    vectors: Array2<f32>,
}

impl EmbeddingIndex {
    /// Build from raw embedding rows, L2-normalizing each.
    pub fn from_rows(mut rows: Vec<Vec<f32>>) -> QaResult<Self> {
        let dimension = rows.first().map(|r| r.len()).unwrap_or(0);
        if dimension == 0 {
            return Err(QaError::EmbeddingService(
                "cannot build an index from empty or zero-length embeddings".into(),
            ));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dimension) {
            return Err(QaError::EmbeddingService(format!(
                "embedding {} has dimension {}, expected {}",
                i,
                row.len(),
                dimension
            )));
        }

        rows.par_iter_mut().for_each(|row| l2_normalize(row));

        let count = rows.len();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let vectors = Array2::from_shape_vec((count, dimension), flat)
            .map_err(|e| QaError::EmbeddingService(format!("invalid embedding matrix: {}", e)))?;
        Ok(Self { vectors })
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.nrows() == 0
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn vectors(&self) -> ArrayView2<'_, f32> {
        self.vectors.view()
    }

    /// Top `k` rows by inner product with `query`, as `(row, score)` pairs.
    ///
    /// Scores are descending; equal scores keep ascending row order.
    pub fn search(&self, query: &[f32], k: usize) -> QaResult<Vec<(usize, f32)>> {
        if query.len() != self.dimension() {
            return Err(QaError::IndexUnavailable(format!(
                "dimension mismatch: query has {}, index has {}",
                query.len(),
                self.dimension()
            )));
        }

        let scores = self.vectors.dot(&ArrayView1::from(query));
        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Serialize to the SQIX layout: magic, version, dim, count, LE f32 rows.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        buf.put_slice(MAGIC);
        buf.put_u32_le(FORMAT_VERSION);
        buf.put_u32_le(self.dimension() as u32);
        buf.put_u64_le(self.len() as u64);
        for v in self.vectors.iter() {
            buf.put_f32_le(*v);
        }
        buf.to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> QaResult<Self> {
        let mut buf = data;
        if buf.remaining() < HEADER_LEN {
            return Err(QaError::IndexUnavailable("index file truncated (header)".into()));
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(QaError::IndexUnavailable("not a statute index file".into()));
        }
        let version = buf.get_u32_le();
        if version != FORMAT_VERSION {
            return Err(QaError::IndexUnavailable(format!(
                "unsupported index format version {}",
                version
            )));
        }
        let dimension = buf.get_u32_le() as usize;
        let count = buf.get_u64_le() as usize;
        if dimension == 0 {
            return Err(QaError::IndexUnavailable("index dimension is zero".into()));
        }

        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| QaError::IndexUnavailable("index header overflows".into()))?;
        if buf.remaining() != expected {
            return Err(QaError::IndexUnavailable(format!(
                "index body is {} bytes, expected {}",
                buf.remaining(),
                expected
            )));
        }

        let mut flat = Vec::with_capacity(count * dimension);
        while buf.has_remaining() {
            flat.push(buf.get_f32_le());
        }

        // Rows written by another tool may not be unit-norm; search assumes they are.
        let renormalized: usize = flat
            .par_chunks_mut(dimension)
            .map(|row| {
                let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > f32::EPSILON && (norm - 1.0).abs() > NORM_TOLERANCE {
                    l2_normalize(row);
                    1
                } else {
                    0
                }
            })
            .sum();
        if renormalized > 0 {
            tracing::warn!(
                rows = renormalized,
                "Index rows were not unit-norm, re-normalized on load"
            );
        }

        let vectors = Array2::from_shape_vec((count, dimension), flat)
            .map_err(|e| QaError::IndexUnavailable(format!("invalid index shape: {}", e)))?;
        Ok(Self { vectors })
    }

    pub fn write_to(&self, path: &Path) -> QaResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> QaResult<Self> {
        let data = std::fs::read(path).map_err(|e| {
            QaError::IndexUnavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> EmbeddingIndex {
        EmbeddingIndex::from_rows(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 2.0, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![0.0, 0.0, 5.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_rows_are_unit_norm() {
        let idx = index();
        for row in idx.vectors().rows() {
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_search_ranks_by_inner_product() {
        let idx = index();
        let hits = idx.search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, 2);
        // rows 1 and 3 tie at 0.0; lower row wins
        assert_eq!(hits[2].0, 1);
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let err = index().search(&[1.0, 0.0], 2).unwrap_err();
        assert!(matches!(err, QaError::IndexUnavailable(_)));
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let err = EmbeddingIndex::from_rows(vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, QaError::EmbeddingService(_)));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let idx = index();
        let restored = EmbeddingIndex::from_bytes(&idx.to_bytes()).unwrap();
        assert_eq!(restored, idx);
    }

    #[test]
    fn test_load_renormalizes_scaled_rows() {
        let idx = index();
        let mut bytes = idx.to_bytes();
        // row 0 = [1, 0, 0] scaled to [2, 0, 0]; row 3 = [0, 0, 1] scaled to [0, 0, 3]
        bytes[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&2.0f32.to_le_bytes());
        let last = bytes.len() - 4;
        bytes[last..].copy_from_slice(&3.0f32.to_le_bytes());

        let restored = EmbeddingIndex::from_bytes(&bytes).unwrap();
        for row in restored.vectors().rows() {
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
        assert_eq!(restored, idx);
        let hits = restored.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_truncated_and_foreign_files_rejected() {
        let bytes = index().to_bytes();
        assert!(EmbeddingIndex::from_bytes(&bytes[..bytes.len() - 2]).is_err());
        assert!(EmbeddingIndex::from_bytes(&bytes[..10]).is_err());

        let mut foreign = bytes.clone();
        foreign[0] = b'X';
        assert!(matches!(
            EmbeddingIndex::from_bytes(&foreign),
            Err(QaError::IndexUnavailable(_))
        ));
    }
}
