//! Query-time retrieval against a loaded index

use std::sync::Arc;

use docrag_core::{Embedder, RagError, Result, ScoredChunk};
use docrag_vector::VectorIndex;

/// Embeds a query and searches one index
///
/// Holds shared handles only; the index is never mutated and nothing is
/// cached between calls.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    /// The index this retriever searches
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// The `top_k` chunks closest to `query`, closest first
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed(query).await?;
        if vector.len() != self.index.dim() {
            return Err(RagError::DimensionMismatch {
                expected: self.index.dim(),
                actual: vector.len(),
            });
        }

        let hits = self.index.search(&vector, top_k)?;
        tracing::debug!("Retrieved {} of {} chunks", hits.len(), self.index.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docrag_core::ChunkMetadata;
    use docrag_vector::FlatIndex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        dim: usize,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(dim: usize, entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                dim,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| RagError::EmbeddingFailure(format!("unknown text {text}")))
        }

        fn dimension(&self) -> usize {
            self.dim
        }
    }

    fn index() -> Arc<dyn VectorIndex> {
        let mut index = FlatIndex::new(2).unwrap();
        index
            .add_rows(
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]],
                vec![
                    ChunkMetadata::new("A", "alpha"),
                    ChunkMetadata::new("B", "beta"),
                    ChunkMetadata::new("C", "gamma"),
                ],
            )
            .unwrap();
        Arc::new(index)
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_distance() {
        let embedder = Arc::new(FixedEmbedder::new(2, &[("east", vec![1.0, 0.0])]));
        let retriever = Retriever::new(index(), embedder.clone());

        let hits = retriever.retrieve("east", 2).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.metadata.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);

        retriever.retrieve("east", 2).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retrieve_dimension_mismatch() {
        let embedder = Arc::new(FixedEmbedder::new(3, &[("q", vec![1.0, 0.0, 0.0])]));
        let retriever = Retriever::new(index(), embedder);

        let err = retriever.retrieve("q", 1).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let embedder = Arc::new(FixedEmbedder::new(2, &[]));
        let retriever = Retriever::new(index(), embedder);

        let err = retriever.retrieve("missing", 1).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure(msg) if msg.contains("missing")));
    }

    #[tokio::test]
    async fn test_retrieve_from_empty_index() {
        let embedder = Arc::new(FixedEmbedder::new(2, &[("q", vec![0.0, 1.0])]));
        let empty: Arc<dyn VectorIndex> = Arc::new(FlatIndex::new(2).unwrap());
        let retriever = Retriever::new(empty, embedder);

        assert!(retriever.retrieve("q", 5).await.unwrap().is_empty());
    }
}
