//! docrag Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! defaults matching a small multilingual MiniLM-style embedding model.
//! Everything is read once at startup; there is no runtime reconfiguration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Chunking parameters
    pub chunking: ChunkingConfig,

    /// Vector index location and shape
    pub index: IndexConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Query-time retrieval configuration
    pub retrieval: RetrievalConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// Keys are the environment variable names listed in the README.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Chunking
        if let Some(value) = lookup("DOCRAG_MAX_CHARS") {
            self.chunking.max_chars = parse_value("DOCRAG_MAX_CHARS", value)?;
        }
        if let Some(value) = lookup("DOCRAG_OVERLAP_CHARS") {
            self.chunking.overlap_chars = parse_value("DOCRAG_OVERLAP_CHARS", value)?;
        }

        // Index
        if let Some(value) = lookup("DOCRAG_EMBEDDING_DIM") {
            self.index.dim = parse_value("DOCRAG_EMBEDDING_DIM", value)?;
        }
        if let Some(path) = lookup("DOCRAG_VECTOR_PATH") {
            self.index.vector_path = path.into();
        }
        if let Some(path) = lookup("DOCRAG_METADATA_PATH") {
            self.index.metadata_path = path.into();
        }
        if let Some(path) = lookup("DOCRAG_DOCUMENTS_DIR") {
            self.index.documents_dir = path.into();
        }

        // Embedding
        if let Some(provider) = lookup("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        // LLM
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }

        // Shared provider endpoints and secrets
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.embedding.openai_api_key = Some(key.clone());
            self.llm.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_API_BASE") {
            self.embedding.openai_base_url = Some(url.clone());
            self.llm.openai_base_url = Some(url);
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.embedding.ollama_url = url.clone();
            self.llm.ollama_url = url;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Check the invariants the chunker and index rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;

        if self.index.dim == 0 {
            return Err(ConfigError::InvalidValue {
                key: "index.dim".to_string(),
                value: "0".to_string(),
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retrieval.top_k".to_string(),
                value: "0".to_string(),
            });
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.batch_size".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Chunking configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub max_chars: usize,

    /// Characters shared between consecutive chunks
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    /// Reject a zero chunk size and overlaps that would swallow a whole chunk
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "chunking.max_chars".to_string(),
                value: "0".to_string(),
            });
        }
        if self.overlap_chars >= self.max_chars {
            return Err(ConfigError::InvalidValue {
                key: "chunking.overlap_chars".to_string(),
                value: format!(
                    "{} (must be smaller than max_chars = {})",
                    self.overlap_chars, self.max_chars
                ),
            });
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 500,
            overlap_chars: 20,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Embedding dimensionality (must match the embedding model)
    pub dim: usize,

    /// Vector matrix file
    pub vector_path: PathBuf,

    /// Metadata file
    pub metadata_path: PathBuf,

    /// Directory the build command reads documents from
    pub documents_dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dim: 384,
            vector_path: PathBuf::from("data/index/docrag.vectors"),
            metadata_path: PathBuf::from("data/index/docrag.meta.json"),
            documents_dir: PathBuf::from("data/pdf"),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider to use
    pub provider: LlmProvider,

    /// Embedding model name
    pub model: String,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Texts per embedding request during index builds
    pub batch_size: usize,

    /// Embedding requests in flight during index builds
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            model: "all-minilm".to_string(),
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            batch_size: 32,
            concurrency: 4,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "provider".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of passages returned per query
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", .path.display())]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
