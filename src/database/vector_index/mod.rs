
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::{QaError, Result};

const INDEX_FILE_VERSION: u32 = 1;

/// Exact nearest-neighbour index over fixed-dimension vectors.
///
/// Vectors are stored row-major in a single buffer; position `i` is the
/// `i`-th vector ever added.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

/// A search hit: the vector's position in the index and its squared
/// Euclidean distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// On-disk layout of the index file
#[derive(Serialize)]
struct IndexFileRef<'a> {
    version: u32,
    dimension: usize,
    data: &'a [f32],
}

#[derive(Deserialize)]
struct IndexFile {
    version: u32,
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index; the dimension is fixed for its lifetime
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(QaError::Embedding(
                "cannot create an index for zero-dimension vectors".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The vector stored at `position`, if any
    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        let end = start.checked_add(self.dimension)?;
        self.data.get(start..end)
    }

    /// Append `vectors` in order. Every vector is checked before anything is
    /// appended, so a mismatch leaves the index unchanged.
    #[inline]
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(QaError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }

        Ok(())
    }

    /// The `k` nearest vectors to `query`, closest first. Ties keep
    /// insertion order. Returns fewer than `k` hits when the index is smaller.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(QaError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                distance: squared_l2(query, vector),
            })
            .collect::<Vec<_>>();

        neighbors.sort_by(|a, b| match a.distance.total_cmp(&b.distance) {
            Ordering::Equal => a.position.cmp(&b.position),
            other => other,
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    /// Write the index to `path` in bincode form
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let state = IndexFileRef {
            version: INDEX_FILE_VERSION,
            dimension: self.dimension,
            data: &self.data,
        };

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &state).map_err(|e| {
            QaError::Io(std::io::Error::other(format!(
                "failed to encode index {}: {e}",
                path.display()
            )))
        })?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        debug!(
            "Saved index to {:?} ({} vectors, dimension {})",
            path,
            self.len(),
            self.dimension
        );

        Ok(())
    }

    /// Read an index written by [`FlatIndex::save`]. Undecodable contents are
    /// reported as [`QaError::CorruptIndexState`].
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let state: IndexFile = bincode::deserialize_from(reader).map_err(|e| {
            QaError::CorruptIndexState(format!("cannot decode {}: {e}", path.display()))
        })?;

        if state.version != INDEX_FILE_VERSION {
            return Err(QaError::CorruptIndexState(format!(
                "index file version mismatch: expected {}, got {}",
                INDEX_FILE_VERSION, state.version
            )));
        }

        if state.dimension == 0 || state.data.len() % state.dimension != 0 {
            return Err(QaError::CorruptIndexState(format!(
                "index file holds {} floats, not a multiple of dimension {}",
                state.data.len(),
                state.dimension
            )));
        }

        let index = Self {
            dimension: state.dimension,
            data: state.data,
        };

        debug!(
            "Loaded index from {:?} ({} vectors, dimension {})",
            path,
            index.len(),
            index.dimension
        );

        Ok(index)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}
