//! docrag Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout docrag:
//! - Documents, chunks and the metadata stored alongside each vector
//! - Common error types
//! - Capability traits for embedding and answer generation
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ChunkingConfig, ConfigError, EmbeddingConfig, IndexConfig, LlmConfig, LlmProvider,
    LoggingConfig, RetrievalConfig,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for docrag operations
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cardinality mismatch: {vectors} vectors but {metadata} metadata records")]
    CardinalityMismatch { vectors: usize, metadata: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Inconsistent index: vector file has {vectors} rows but metadata file has {metadata} records")]
    ConsistencyError { vectors: usize, metadata: usize },

    #[error("Index file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Corrupt index file: {0}")]
    CorruptIndex(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ConfigError> for RagError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Document Models
// ============================================================================

/// A raw document handed to the chunker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within a build run (the file name for loaded files)
    pub doc_id: String,

    /// Full text content
    pub text: String,
}

impl Document {
    /// Create a new document
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
        }
    }
}

/// A bounded fragment of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Source document ID
    pub doc_id: String,

    /// Fragment text, including the overlap prefix
    pub text: String,

    /// Position within the source document (0, 1, 2, ...)
    pub sequence: u32,

    /// Number of leading characters of `text` copied from the previous chunk
    pub overlap: usize,
}

impl Chunk {
    /// The part of `text` that is new relative to the previous chunk
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((idx, _)) => &self.text[idx..],
            None => "",
        }
    }
}

/// Metadata stored alongside each vector in the index
///
/// Only `doc_id` and `text` are required. Fields that later versions add
/// land in `extra` when read by an older build, so index files stay
/// readable in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source document ID
    pub doc_id: String,

    /// Chunk text
    pub text: String,

    /// Chunk sequence within the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,

    /// Additional fields, never named like one of the fields above
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

/// Field names an extra entry may not use
const RESERVED_KEYS: [&str; 3] = ["doc_id", "text", "sequence"];

impl ChunkMetadata {
    /// Create metadata with only the required fields
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            sequence: None,
            extra: BTreeMap::new(),
        }
    }

    /// Attach an extra field
    ///
    /// Fails with `ConfigError` when `key` collides with a named field, since
    /// such a record could be saved but not read back.
    pub fn with_extra(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<Self> {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(RagError::ConfigError(format!(
                "extra metadata key '{key}' is reserved"
            )));
        }
        self.extra.insert(key, value.into());
        Ok(self)
    }

    /// Extra fields, in key order
    pub fn extra(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.extra
    }
}

impl From<&Chunk> for ChunkMetadata {
    fn from(chunk: &Chunk) -> Self {
        Self {
            doc_id: chunk.doc_id.clone(),
            text: chunk.text.clone(),
            sequence: Some(chunk.sequence),
            extra: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Search Types
// ============================================================================

/// A search hit: the stored metadata and its squared L2 distance to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub metadata: ChunkMetadata,

    /// Squared Euclidean distance (lower is closer)
    pub distance: f32,
}

// ============================================================================
// Traits
// ============================================================================

/// Capability that maps text to a fixed-length vector
///
/// Implementations are expected to return unit-length vectors so that
/// squared L2 ranking matches cosine ranking. The index does not check this.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Get embedding dimension
    fn dimension(&self) -> usize;
}

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Scale a vector to unit Euclidean norm in place
///
/// Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
