//! Query augmentation interface.
//!
//! An augmenter rewrites the user's research question into per-source query
//! strings: a Boolean/MeSH expression for PubMed, natural language for the
//! embedding-based engines. Implementations live outside this crate (they
//! call a language-model service); the pipeline treats augmentation as
//! best-effort and falls back to the raw query on any failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::evidence::StudyType;

/// Per-source rewrites of one research question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AugmentedQuery {
    /// Boolean query with MeSH terms and field tags, e.g.
    /// `("SGLT2 Inhibitors"[MeSH] OR empagliflozin) AND "Heart Failure"[MeSH]`.
    pub pubmed_query: String,

    /// Natural-language query for embedding-based search.
    pub semantic_scholar_query: String,

    /// Concept-and-synonym keyword query.
    pub open_alex_query: String,

    #[serde(default)]
    pub suggested_filters: SuggestedFilters,
}

/// Filters the augmenter inferred from the question's context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestedFilters {
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    #[serde(default)]
    pub study_types: Vec<StudyType>,
}

/// Error from an augmentation attempt. The pipeline only logs it.
#[derive(Debug, thiserror::Error)]
#[error("query augmentation failed: {0}")]
pub struct AugmentError(pub String);

/// External query-rewriting collaborator.
#[async_trait]
pub trait QueryAugmenter: Send + Sync + std::fmt::Debug {
    async fn augment(&self, query: &str) -> Result<AugmentedQuery, AugmentError>;
}
