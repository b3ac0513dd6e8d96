//! Embedding and rerank provider capabilities
//!
//! Providers are narrow async interfaces loaded once at initialization and
//! passed through the engine handle. They are never on the critical write
//! path: absence or failure of a provider degrades retrieval quality but
//! never blocks an operation.

mod config;
#[cfg(feature = "remote-providers")]
mod http;

pub use config::{resolve_instruction_prefix, EmbeddingSettings, RerankSettings};
#[cfg(feature = "remote-providers")]
pub use http::{GeminiEmbeddings, HttpRerank, OpenAiCompatEmbeddings};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{Result, Store};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Provider error. Never converted into a store error - call sites degrade
/// instead.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure
    #[error("Provider request failed: {0}")]
    Request(String),
    /// The provider answered with something unusable
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// The provider is not configured or was cancelled
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// CAPABILITY TRAITS
// ============================================================================

/// A document/query embedding capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider id ("openai", "gemini", "qwen", ...)
    fn id(&self) -> &str;

    /// Model name embeddings are stored under
    fn model(&self) -> &str;

    /// Declared vector length, when known ahead of time
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Query instruction prefix. Documents are never prefixed.
    fn instruction_prefix(&self) -> Option<&str> {
        None
    }

    /// Deterministic document embedding.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;

    /// Query embedding. When an instruction prefix is configured the query
    /// is wrapped in the instruct template; otherwise identical to
    /// [`embed`](Self::embed).
    async fn embed_query(&self, query: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        match self.instruction_prefix() {
            Some(prefix) => {
                self.embed(&format!("Instruct: {}\nQuery: {}", prefix, query))
                    .await
            }
            None => self.embed(query).await,
        }
    }
}

/// One scored document from an external reranker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedDoc {
    /// Index into the submitted document list
    pub index: usize,
    /// Cross-encoder relevance score; replaces the retrieval score
    pub relevance_score: f64,
}

/// An external cross-encoder rerank capability.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    fn id(&self) -> &str;
    fn model(&self) -> &str;

    /// Score each document against the query.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> std::result::Result<Vec<RankedDoc>, ProviderError>;
}

/// The providers configured for one engine instance.
#[derive(Default)]
pub struct ProviderSet {
    pub embedding: Option<Box<dyn EmbeddingProvider>>,
    pub rerank: Option<Box<dyn RerankProvider>>,
}

impl ProviderSet {
    /// No providers: BM25-only retrieval, local weighting only.
    pub fn none() -> Self {
        Self::default()
    }
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Cosine similarity between two vectors; 0.0 when lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ============================================================================
// BACKFILL SWEEP
// ============================================================================

/// Outcome of an embed-missing sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedReport {
    pub embedded: i64,
    pub failed: i64,
}

/// Embed memories in scope that lack a vector under the provider's model.
///
/// Best-effort: individual failures are logged and counted, never raised.
pub async fn embed_missing(
    store: &Store,
    provider: &dyn EmbeddingProvider,
    agent_id: &str,
    limit: i64,
) -> Result<EmbedReport> {
    let missing = store.memories_missing_embedding(agent_id, provider.model(), limit)?;
    let mut report = EmbedReport::default();
    for memory in missing {
        match provider.embed(&memory.content).await {
            Ok(vector) => {
                store.upsert_embedding(agent_id, &memory.id, provider.model(), &vector)?;
                report.embedded += 1;
            }
            Err(e) => {
                warn!("embedding sweep failed for {}: {}", memory.id, e);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        prefix: Option<String>,
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmbeddingProvider for StaticProvider {
        fn id(&self) -> &str {
            "static"
        }
        fn model(&self) -> &str {
            "static-1"
        }
        fn instruction_prefix(&self) -> Option<&str> {
            self.prefix.as_deref()
        }
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn test_embed_query_wraps_with_prefix() {
        let provider = StaticProvider {
            prefix: Some("Retrieve relevant documents".to_string()),
            seen: std::sync::Mutex::new(Vec::new()),
        };
        provider.embed_query("hello").await.unwrap();
        provider.embed("hello").await.unwrap();

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0], "Instruct: Retrieve relevant documents\nQuery: hello");
        // Document embedding is never prefixed
        assert_eq!(seen[1], "hello");
    }

    #[tokio::test]
    async fn test_embed_query_without_prefix_is_plain() {
        let provider = StaticProvider {
            prefix: None,
            seen: std::sync::Mutex::new(Vec::new()),
        };
        provider.embed_query("hello").await.unwrap();
        assert_eq!(provider.seen.lock().unwrap()[0], "hello");
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        // Length mismatch and zero vectors degrade to 0
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
