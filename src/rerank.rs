//! Neural reranking interface.
//!
//! A reranker scores documents (`"title. abstract-or-tldr"`) against the
//! query and returns one score per document, index-aligned with the input.
//! Implementations call an external service and live outside this crate;
//! when no reranker is configured the pipeline keeps the fused order.

use async_trait::async_trait;

/// Error from a rerank attempt. The pipeline falls back to the fused order.
#[derive(Debug, thiserror::Error)]
#[error("rerank failed: {0}")]
pub struct RerankError(pub String);

/// External relevance-scoring collaborator.
#[async_trait]
pub trait Reranker: Send + Sync + std::fmt::Debug {
    /// Score each document against the query. The returned vector must be
    /// the same length as `documents`, index-aligned.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError>;
}
