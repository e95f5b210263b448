//! docrag RAG - Retrieval-Augmented Generation pipeline
//!
//! This crate ties the pieces together:
//! - [`IndexBuilder`] chunks and embeds documents into a [`FlatIndex`]
//! - [`Retriever`] embeds a question and searches a loaded index
//! - [`RagPipeline`] formats the retrieved passages into a prompt and asks
//!   an LLM for a grounded answer
//!
//! [`FlatIndex`]: docrag_vector::FlatIndex

use docrag_core::{LlmClient, Result, ScoredChunk};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

pub mod builder;
pub mod llm;
pub mod prompt;
pub mod retriever;

pub use builder::IndexBuilder;
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use prompt::{format_passages, PromptBuilder};
pub use retriever::Retriever;

// ============================================================================
// Pipeline
// ============================================================================

/// Answer to one question, with the passages it was grounded on
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    /// Generated answer, trimmed of surrounding whitespace
    pub answer: String,

    /// Retrieved passages in rank order
    pub passages: Vec<ScoredChunk>,

    /// Wall-clock time spent answering
    pub processing_time_ms: u64,
}

/// Retrieve-then-generate question answering
pub struct RagPipeline {
    retriever: Retriever,
    llm_client: Arc<dyn LlmClient>,
}

impl RagPipeline {
    /// Create a new pipeline
    pub fn new(retriever: Retriever, llm_client: Arc<dyn LlmClient>) -> Self {
        Self {
            retriever,
            llm_client,
        }
    }

    /// The retriever used for the search step
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer `question` from the `top_k` closest passages
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<RagAnswer> {
        let start_time = Instant::now();

        tracing::info!("RAG query started");
        let passages = self.retriever.retrieve(question, top_k).await?;
        tracing::debug!("Retrieved {} passages", passages.len());

        let prompt = format_passages(&passages, question);
        tracing::info!("Calling LLM with prompt length: {} chars", prompt.len());
        let answer = self.llm_client.generate(&prompt).await?;
        tracing::info!("LLM response received: {} chars", answer.len());

        Ok(RagAnswer {
            answer: answer.trim().to_string(),
            passages,
            processing_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docrag_core::{ChunkMetadata, Embedder, RagError};
    use docrag_vector::{FlatIndex, VectorIndex};
    use std::sync::Mutex;

    struct ConstantEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }
    }

    /// Records the last prompt and replies with a fixed answer
    struct RecordingLlm {
        reply: String,
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if let Ok(mut last) = self.last_prompt.lock() {
                *last = Some(prompt.to_string());
            }
            Ok(self.reply.clone())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(RagError::GenerationFailure("model unavailable".to_string()))
        }
    }

    fn retriever() -> Retriever {
        let mut index = FlatIndex::new(2).unwrap();
        index
            .add_rows(
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
                vec![
                    ChunkMetadata::new("gdpr.pdf", "Personal data must be minimised."),
                    ChunkMetadata::new("menu.txt", "Soup of the day."),
                ],
            )
            .unwrap();
        let index: Arc<dyn VectorIndex> = Arc::new(index);
        Retriever::new(index, Arc::new(ConstantEmbedder(vec![1.0, 0.0])))
    }

    #[tokio::test]
    async fn test_answer_is_trimmed_and_grounded() {
        let llm = Arc::new(RecordingLlm {
            reply: "  Data minimisation [1].\n".to_string(),
            last_prompt: Mutex::new(None),
        });
        let pipeline = RagPipeline::new(retriever(), llm.clone());

        let answer = pipeline.answer("What about personal data?", 1).await.unwrap();

        assert_eq!(answer.answer, "Data minimisation [1].");
        assert_eq!(answer.passages.len(), 1);
        assert_eq!(answer.passages[0].metadata.doc_id, "gdpr.pdf");

        let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("[1 — gdpr.pdf]: Personal data must be minimised."));
        assert!(!prompt.contains("menu.txt"));
        assert!(prompt.contains("What about personal data?"));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let pipeline = RagPipeline::new(retriever(), Arc::new(FailingLlm));
        let err = pipeline.answer("anything", 2).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationFailure(_)));
    }
}
