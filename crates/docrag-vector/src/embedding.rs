//! Embedding clients for generating vector representations
//!
//! Supports OpenAI-compatible and Ollama embedding APIs. Both clients
//! scale every returned vector to unit length, so squared L2 ranking in the
//! index agrees with cosine similarity.

use std::sync::Arc;

use async_trait::async_trait;
use docrag_core::{
    l2_normalize, ConfigError, Embedder, EmbeddingConfig, LlmProvider, RagError, Result,
};
use futures::{StreamExt, TryStreamExt};
use ndarray::Array2;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Check the vector lengths an API returned, then normalize them
fn finish(mut vectors: Vec<Vec<f32>>, dimension: usize) -> Result<Vec<Vec<f32>>> {
    for vector in &mut vectors {
        if vector.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        l2_normalize(vector);
    }
    Ok(vectors)
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Put an OpenAI response back in request order, checking that one vector
/// came back per input
fn ordered_embeddings(
    response: OpenAiEmbeddingResponse,
    requested: usize,
) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != requested {
        return Err(RagError::EmbeddingFailure(format!(
            "Requested {requested} embeddings, received {}",
            response.data.len()
        )));
    }

    // The API may return items out of order
    let mut data = response.data;
    data.sort_by_key(|e| e.index);
    Ok(data.into_iter().map(|e| e.embedding).collect())
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536,
        };

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE.to_string(),
            model,
            dimension,
        }
    }

    /// Point the client at an OpenAI-compatible server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the dimension implied by the model name
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired("OPENAI_API_KEY".to_string()))?;

        let client = Self::new(api_key.clone(), config.model.clone());
        Ok(match &config.openai_base_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingFailure("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAiEmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingFailure(format!("Embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingFailure(format!(
                "OpenAI embedding error ({status}): {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
            RagError::EmbeddingFailure(format!("Failed to parse embedding response: {e}"))
        })?;

        finish(ordered_embeddings(result, texts.len())?, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768,
        };

        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimension,
        }
    }

    /// Override the dimension implied by the model name
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.model.clone())
    }
}

#[async_trait]
impl Embedder for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                RagError::EmbeddingFailure(format!("Ollama embedding request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingFailure(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            RagError::EmbeddingFailure(format!("Failed to parse embedding response: {e}"))
        })?;

        let mut vectors = finish(vec![result.embedding], self.dimension)?;
        vectors
            .pop()
            .ok_or_else(|| RagError::EmbeddingFailure("No embedding returned".to_string()))
    }

    // Ollama has no batch endpoint; the default trait method embeds one text at a time

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Factory and batch helpers
// ============================================================================

/// Create an embedder producing vectors of length `dim`
pub fn create_embedder(config: &EmbeddingConfig, dim: usize) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Arc::new(
            OpenAiEmbedding::from_config(config)?.with_dimension(dim),
        )),
        LlmProvider::Ollama => Ok(Arc::new(
            OllamaEmbedding::from_config(config).with_dimension(dim),
        )),
    }
}

/// Embed `texts` into an `(n, dim)` matrix, row `i` for `texts[i]`
///
/// Texts are sent in batches of `batch_size` with up to `concurrency`
/// requests in flight. Output order always follows input order.
pub async fn embed_texts(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    concurrency: usize,
) -> Result<Array2<f32>> {
    let dim = embedder.dimension();
    if texts.is_empty() {
        return Ok(Array2::zeros((0, dim)));
    }

    let batches: Vec<Vec<Vec<f32>>> = futures::stream::iter(texts.chunks(batch_size.max(1)))
        .map(|batch| embedder.embed_batch(batch))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let mut data = Vec::with_capacity(texts.len() * dim);
    let mut rows = 0;
    for vector in batches.into_iter().flatten() {
        if vector.len() != dim {
            return Err(RagError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        data.extend_from_slice(&vector);
        rows += 1;
    }

    if rows != texts.len() {
        return Err(RagError::EmbeddingFailure(format!(
            "Requested {} embeddings, received {rows}",
            texts.len()
        )));
    }

    tracing::debug!("Embedded {} texts (dim {})", rows, dim);
    Array2::from_shape_vec((rows, dim), data)
        .map_err(|e| RagError::EmbeddingFailure(format!("Bad embedding matrix: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds a text as `[len, 0, 0, ...]`
    struct CountingEmbedder {
        dim: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut v = vec![0.0; self.dim];
            v[0] = text.len() as f32;
            Ok(v)
        }

        fn dimension(&self) -> usize {
            self.dim
        }
    }

    /// Returns vectors of the wrong length
    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 2.0])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    #[test]
    fn test_openai_dimension() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-small");
        assert_eq!(client.dimension(), 1536);

        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-large");
        assert_eq!(client.dimension(), 3072);

        let client = client.with_dimension(256);
        assert_eq!(client.dimension(), 256);
    }

    #[test]
    fn test_ollama_dimension() {
        let client = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text");
        assert_eq!(client.dimension(), 768);

        let client = OllamaEmbedding::new("http://localhost:11434", "all-minilm");
        assert_eq!(client.dimension(), 384);
    }

    #[test]
    fn test_openai_base_url() {
        let client = OpenAiEmbedding::new("k", "m");
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/embeddings");

        let client = client.with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = EmbeddingConfig {
            provider: LlmProvider::OpenAI,
            ..Default::default()
        };
        let err = OpenAiEmbedding::from_config(&config).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required configuration: OPENAI_API_KEY"
        );
        assert!(create_embedder(&config, 8).is_err());
    }

    #[test]
    fn test_create_embedder_uses_requested_dim() {
        let embedder = create_embedder(&EmbeddingConfig::default(), 64).unwrap();
        assert_eq!(embedder.dimension(), 64);
    }

    #[test]
    fn test_finish_normalizes() {
        let out = finish(vec![vec![3.0, 4.0]], 2).unwrap();
        assert!((out[0][0] - 0.6).abs() < 1e-6);
        assert!((out[0][1] - 0.8).abs() < 1e-6);

        assert!(matches!(
            finish(vec![vec![1.0]], 2),
            Err(RagError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_openai_response_order() {
        let json = r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#;
        let parsed: OpenAiEmbeddingResponse = serde_json::from_str(json).unwrap();

        let vectors = ordered_embeddings(parsed, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_openai_response_count_mismatch() {
        let json = r#"{"data":[{"embedding":[1.0,0.0],"index":0}]}"#;
        let parsed: OpenAiEmbeddingResponse = serde_json::from_str(json).unwrap();

        let err = ordered_embeddings(parsed, 3).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure(ref msg) if msg.contains("Requested 3")));
    }

    #[tokio::test]
    async fn test_embed_texts_preserves_order() {
        let embedder = CountingEmbedder {
            dim: 4,
            calls: AtomicUsize::new(0),
        };
        let texts: Vec<String> = (1..=7).map(|n| "x".repeat(n)).collect();

        let matrix = embed_texts(&embedder, &texts, 2, 3).await.unwrap();

        assert_eq!(matrix.dim(), (7, 4));
        for (i, row) in matrix.outer_iter().enumerate() {
            assert_eq!(row[0], (i + 1) as f32);
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_embed_texts_empty() {
        let embedder = CountingEmbedder {
            dim: 5,
            calls: AtomicUsize::new(0),
        };
        let matrix = embed_texts(&embedder, &[], 8, 2).await.unwrap();
        assert_eq!(matrix.dim(), (0, 5));
    }

    #[tokio::test]
    async fn test_embed_texts_wrong_dimension() {
        let err = embed_texts(&BrokenEmbedder, &["a".to_string()], 8, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }
}
