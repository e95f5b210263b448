//! Exact brute-force vector index
//!
//! Vectors live in one contiguous `(n, dim)` matrix and every search scans
//! all rows. Row `i` of the matrix pairs with `metadata[i]`; the row index is
//! the entry's `vec_id`.

use std::cmp::Ordering;
use std::path::Path;

use docrag_core::{ChunkMetadata, RagError, Result, ScoredChunk};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::{codec, VectorIndex};

/// In-memory flat index over squared L2 distance
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    vectors: Array2<f32>,
    metadata: Vec<ChunkMetadata>,
}

impl FlatIndex {
    /// Create an empty index for vectors of length `dim`
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(RagError::ConfigError(
                "index dimension must be positive".to_string(),
            ));
        }
        Ok(Self {
            dim,
            vectors: Array2::zeros((0, dim)),
            metadata: Vec::new(),
        })
    }

    /// Load a persisted index, taking its dimension from the vector file
    pub fn open(vector_path: &Path, metadata_path: &Path) -> Result<Self> {
        let dim = codec::read_dim(vector_path)?;
        let mut index = Self::new(dim)?;
        index.load(vector_path, metadata_path)?;
        Ok(index)
    }

    /// Stored metadata in `vec_id` order
    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    /// Stored vectors, one row per entry
    pub fn vectors(&self) -> ArrayView2<'_, f32> {
        self.vectors.view()
    }

    /// Vector and metadata for one entry
    pub fn get(&self, vec_id: usize) -> Option<(ArrayView1<'_, f32>, &ChunkMetadata)> {
        let meta = self.metadata.get(vec_id)?;
        Some((self.vectors.row(vec_id), meta))
    }

    /// Append rows given as separate vectors
    pub fn add_rows(&mut self, rows: &[Vec<f32>], metadatas: Vec<ChunkMetadata>) -> Result<()> {
        if rows.len() != metadatas.len() {
            return Err(RagError::CardinalityMismatch {
                vectors: rows.len(),
                metadata: metadatas.len(),
            });
        }
        if let Some(bad) = rows.iter().find(|row| row.len() != self.dim) {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                actual: bad.len(),
            });
        }

        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((rows.len(), self.dim), flat).map_err(|_| {
            RagError::DimensionMismatch {
                expected: self.dim,
                actual: 0,
            }
        })?;
        self.add(matrix.view(), metadatas)
    }
}

fn squared_l2(a: ArrayView1<'_, f32>, b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

impl VectorIndex for FlatIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.metadata.len()
    }

    fn add(&mut self, vectors: ArrayView2<'_, f32>, metadatas: Vec<ChunkMetadata>) -> Result<()> {
        let (rows, cols) = vectors.dim();
        if rows != metadatas.len() {
            return Err(RagError::CardinalityMismatch {
                vectors: rows,
                metadata: metadatas.len(),
            });
        }
        if cols != self.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                actual: cols,
            });
        }
        if rows == 0 {
            return Ok(());
        }

        self.vectors
            .append(Axis(0), vectors)
            .map_err(|_| RagError::DimensionMismatch {
                expected: self.dim,
                actual: cols,
            })?;
        self.metadata.extend(metadatas);

        tracing::debug!("Added {} vectors (total {})", rows, self.metadata.len());
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        if top_k == 0 || self.metadata.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .outer_iter()
            .map(|row| squared_l2(row, query))
            .enumerate()
            .collect();

        let by_distance = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
            a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
        };
        if top_k < scored.len() {
            scored.select_nth_unstable_by(top_k - 1, by_distance);
            scored.truncate(top_k);
        }
        scored.sort_unstable_by(by_distance);

        Ok(scored
            .into_iter()
            .map(|(vec_id, distance)| ScoredChunk {
                metadata: self.metadata[vec_id].clone(),
                distance,
            })
            .collect())
    }

    fn save(&self, vector_path: &Path, metadata_path: &Path) -> Result<()> {
        codec::write_pair(vector_path, metadata_path, self.vectors.view(), &self.metadata)?;
        tracing::info!(
            "Saved {} vectors (dim {}) to {}",
            self.metadata.len(),
            self.dim,
            vector_path.display()
        );
        Ok(())
    }

    fn load(&mut self, vector_path: &Path, metadata_path: &Path) -> Result<()> {
        let vectors = codec::read_vectors(vector_path)?;
        let metadata = codec::read_metadata(metadata_path)?;

        if vectors.ncols() != self.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                actual: vectors.ncols(),
            });
        }
        if vectors.nrows() != metadata.len() {
            return Err(RagError::ConsistencyError {
                vectors: vectors.nrows(),
                metadata: metadata.len(),
            });
        }

        self.vectors = vectors;
        self.metadata = metadata;
        tracing::info!(
            "Loaded {} vectors (dim {}) from {}",
            self.metadata.len(),
            self.dim,
            vector_path.display()
        );
        Ok(())
    }
}
