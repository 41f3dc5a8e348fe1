//! # litfuse
//!
//! Federated biomedical literature search: fan out one query to PubMed,
//! Semantic Scholar, OpenAlex and ClinicalTrials.gov, normalize each
//! source's payload into one record shape, and fuse the per-source rankings
//! into a single deduplicated list with Reciprocal Rank Fusion.
//!
//! ## Architecture
//!
//! - [`models`]: the unified record, request/response shapes
//! - [`evidence`]: study-type canonicalization and evidence levels I–V
//! - [`sources`]: one adapter per upstream service, behind [`sources::SearchSource`]
//! - [`fusion`]: RRF scoring with cross-source identity resolution
//! - [`pipeline`]: the orchestrator (augment, fan out, fuse, rerank, filter,
//!   sort, paginate)
//! - [`augment`] / [`rerank`]: interfaces for the external AI collaborators
//! - [`utils`]: resilient transport, circuit breakers, key rotation
//! - [`config`]: configuration management

pub mod augment;
pub mod config;
pub mod evidence;
pub mod fusion;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use models::{SearchRequest, SearchResults, SourceId, UnifiedRecord};
pub use pipeline::SearchPipeline;
pub use sources::{SearchSource, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
