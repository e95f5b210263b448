//! Offline index construction
//!
//! Documents are chunked, the chunk texts embedded in batches, and each
//! embedding row added to a [`FlatIndex`] together with the metadata of the
//! chunk it came from.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use docrag_core::{ChunkMetadata, Document, Embedder, EmbeddingConfig, RagError, Result};
use docrag_parser::Chunker;
use docrag_vector::{embed_texts, FlatIndex, VectorIndex};

/// Builds a [`FlatIndex`] from raw documents
pub struct IndexBuilder {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    /// Texts per embedding request
    batch_size: usize,
    /// Embedding requests in flight
    concurrency: usize,
}

impl IndexBuilder {
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>) -> Self {
        let defaults = EmbeddingConfig::default();
        Self {
            chunker,
            embedder,
            batch_size: defaults.batch_size,
            concurrency: defaults.concurrency,
        }
    }

    /// Set the number of texts per embedding request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the number of concurrent embedding requests
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Chunk, embed and index `documents`
    ///
    /// Row `i` of the result holds the `i`-th chunk in document order.
    pub async fn build(&self, documents: &[Document]) -> Result<FlatIndex> {
        let start = Instant::now();

        let chunks = self.chunker.chunk_all(documents);
        tracing::info!(
            "Chunked {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_texts(
            self.embedder.as_ref(),
            &texts,
            self.batch_size,
            self.concurrency,
        )
        .await?;

        let mut index = FlatIndex::new(self.embedder.dimension())?;
        let metadata = chunks.iter().map(ChunkMetadata::from).collect();
        index.add(vectors.view(), metadata)?;

        tracing::info!(
            "Indexed {} chunks (dim {}) in {} ms",
            index.len(),
            index.dim(),
            start.elapsed().as_millis()
        );
        Ok(index)
    }

    /// Build the index and persist it to the given pair of paths
    ///
    /// The file writes run on the blocking thread pool.
    pub async fn build_and_save(
        &self,
        documents: &[Document],
        vector_path: impl Into<PathBuf>,
        metadata_path: impl Into<PathBuf>,
    ) -> Result<FlatIndex> {
        let index = self.build(documents).await?;
        let vector_path = vector_path.into();
        let metadata_path = metadata_path.into();

        let join_path = vector_path.clone();
        tokio::task::spawn_blocking(move || -> Result<FlatIndex> {
            index.save(&vector_path, &metadata_path)?;
            Ok(index)
        })
        .await
        .map_err(|e| RagError::io(join_path, std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docrag_core::ChunkingConfig;

    /// Letter histogram over `a..=d`, normalised
    struct HistogramEmbedder;

    #[async_trait]
    impl Embedder for HistogramEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; 4];
            for c in text.chars() {
                if let Some(slot) = "abcd".find(c) {
                    v[slot] += 1.0;
                }
            }
            docrag_core::l2_normalize(&mut v);
            Ok(v)
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    fn builder(max_chars: usize) -> IndexBuilder {
        let chunker = Chunker::new(ChunkingConfig {
            max_chars,
            overlap_chars: 0,
        })
        .unwrap();
        IndexBuilder::new(chunker, Arc::new(HistogramEmbedder)).with_batch_size(2)
    }

    #[tokio::test]
    async fn test_build_pairs_rows_with_chunks() {
        let docs = vec![
            Document::new("one", "aaaa bbbb"),
            Document::new("two", "cccc"),
        ];
        let index = builder(5).build(&docs).await.unwrap();

        let ids: Vec<_> = index
            .metadata()
            .iter()
            .map(|m| (m.doc_id.as_str(), m.sequence))
            .collect();
        assert_eq!(ids, vec![("one", Some(0)), ("one", Some(1)), ("two", Some(0))]);
        assert_eq!(index.dim(), 4);

        let hits = index.search(&[0.0, 0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].metadata.doc_id, "two");
    }

    #[tokio::test]
    async fn test_build_empty_corpus() {
        let index = builder(10).build(&[]).await.unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dim(), 4);
    }

    #[tokio::test]
    async fn test_build_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vpath = dir.path().join("index.vectors");
        let mpath = dir.path().join("index.meta.json");

        let docs = vec![Document::new("d", "abcd dcba")];
        let built = builder(4)
            .build_and_save(&docs, &vpath, &mpath)
            .await
            .unwrap();

        let loaded = FlatIndex::open(&vpath, &mpath).unwrap();
        assert_eq!(loaded.metadata(), built.metadata());
    }
}
