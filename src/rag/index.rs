//! Exact nearest-neighbor vector index.
//!
//! Vectors are stored row-major in one flat buffer; ids are their positions.
//! Search compares the query against every stored vector, so results are
//! exact and reproducible for the corpus sizes this crate targets.
//!
//! On-disk layout (little-endian):
//!
//! ```text
//! u32 dimension | u32 count | count * dimension * f32
//! ```

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{RagError, RagResult};

const HEADER_LEN: usize = 8;

/// Distance function used by [`VectorIndex::search`]. Smaller is closer for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// Negated dot product.
    InnerProduct,
}

impl Metric {
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
            Metric::InnerProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    metric: Metric,
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> RagResult<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidDimension(dimension));
        }
        Ok(Self {
            dimension,
            metric: Metric::default(),
            data: Vec::new(),
        })
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn count(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        let start = id.checked_mul(self.dimension)?;
        let end = start.checked_add(self.dimension)?;
        self.data.get(start..end)
    }

    /// Append vectors, assigning ids `count, count + 1, ...` in order.
    /// The whole batch is checked first; on error nothing is appended.
    pub fn add_batch<V: AsRef<[f32]>>(&mut self, vectors: &[V]) -> RagResult<()> {
        for v in vectors {
            self.check_dimension(v.as_ref().len())?;
        }
        self.data.reserve(vectors.len() * self.dimension);
        for v in vectors {
            self.data.extend_from_slice(v.as_ref());
        }
        Ok(())
    }

    /// The `min(k, count)` closest vectors, ascending by distance, ties by id.
    pub fn search(&self, query: &[f32], k: usize) -> RagResult<Vec<SearchHit>> {
        self.check_dimension(query.len())?;

        let k = k.min(self.count());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(id, v)| SearchHit {
                id,
                distance: self.metric.distance(query, v),
            })
            .collect();

        let order = |a: &SearchHit, b: &SearchHit| {
            a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id))
        };
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, order);
            hits.truncate(k);
        }
        hits.sort_unstable_by(order);

        tracing::debug!(
            k,
            count = self.count(),
            best = hits.first().map(|h| h.distance),
            "index search complete"
        );
        Ok(hits)
    }

    fn check_dimension(&self, actual: usize) -> RagResult<()> {
        if actual != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> RagResult<()> {
        let dimension = u32::try_from(self.dimension)
            .map_err(|_| RagError::CorruptIndex("dimension exceeds u32 header".into()))?;
        let count = u32::try_from(self.count())
            .map_err(|_| RagError::CorruptIndex("vector count exceeds u32 header".into()))?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&dimension.to_le_bytes())?;
        writer.write_all(&count.to_le_bytes())?;
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), dimension, count, "index written");
        Ok(())
    }

    /// Load an index written by [`VectorIndex::save`]. The metric is not part
    /// of the file; callers apply it with [`VectorIndex::with_metric`].
    pub fn load(path: &Path) -> RagResult<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RagError::IndexNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> RagResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RagError::CorruptIndex(format!(
                "header truncated: {} bytes",
                bytes.len()
            )));
        }
        let dimension = read_u32(&bytes[0..4]) as usize;
        let count = read_u32(&bytes[4..8]) as usize;
        if dimension == 0 {
            return Err(RagError::CorruptIndex("zero dimension in header".into()));
        }

        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or_else(|| RagError::CorruptIndex("header sizes overflow".into()))?;
        if bytes.len() != expected {
            return Err(RagError::CorruptIndex(format!(
                "expected {expected} bytes for {count} x {dimension} vectors, found {}",
                bytes.len()
            )));
        }

        let data = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self {
            dimension,
            metric: Metric::default(),
            data,
        })
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
