//! docrag Vector - Vector index abstraction
//!
//! Provides the `VectorIndex` seam, an exact brute-force implementation
//! (`FlatIndex`) with its on-disk format, and HTTP embedding clients.

use docrag_core::{ChunkMetadata, Result, ScoredChunk};
use ndarray::ArrayView2;
use std::path::Path;

pub mod codec;
pub mod embedding;
pub mod flat;

pub use embedding::{create_embedder, embed_texts, OllamaEmbedding, OpenAiEmbedding};
pub use flat::FlatIndex;

/// Trait for vector index operations
///
/// Every stored vector is paired with exactly one metadata record and is
/// addressed by its zero-based insertion position. Entries are immutable
/// once added.
pub trait VectorIndex: Send + Sync {
    /// Dimensionality of every stored vector
    fn dim(&self) -> usize;

    /// Number of stored entries
    fn len(&self) -> usize;

    /// Whether the index holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `vectors` (shape `(n, dim)`) paired row by row with `metadatas`
    ///
    /// Either every row is added or none is.
    fn add(&mut self, vectors: ArrayView2<'_, f32>, metadatas: Vec<ChunkMetadata>) -> Result<()>;

    /// The `top_k` entries closest to `query`, closest first
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// Persist vectors and metadata to two files
    fn save(&self, vector_path: &Path, metadata_path: &Path) -> Result<()>;

    /// Replace the in-memory state with a persisted pair
    ///
    /// On error the receiver keeps its previous state.
    fn load(&mut self, vector_path: &Path, metadata_path: &Path) -> Result<()>;
}
