//! Source adapters for the federated search fan-out.
//!
//! Each upstream service gets one adapter implementing [`SearchSource`]:
//! build the source-specific query, call it through the resilient transport
//! and that service's circuit breaker, and map the native payload into
//! [`UnifiedRecord`]s. Adapters propagate typed errors; containment happens
//! in the pipeline, where any adapter failure degrades to an empty result
//! set for that source instead of failing the whole search.

mod clinical_trials;
mod openalex;
mod pubmed;
mod registry;
mod semantic;

pub use clinical_trials::ClinicalTrialsSource;
pub use openalex::OpenAlexSource;
pub use pubmed::PubMedSource;
pub use registry::SourceRegistry;
pub use semantic::SemanticScholarSource;

use async_trait::async_trait;

use crate::models::{SearchOptions, SourceId, SourceResults};

/// A searchable upstream service.
#[async_trait]
pub trait SearchSource: Send + Sync + std::fmt::Debug {
    /// Which service this adapter wraps.
    fn id(&self) -> SourceId;

    /// Search for records matching the (already source-specific) query.
    async fn search(&self, query: &str, opts: &SearchOptions)
        -> Result<SourceResults, SourceError>;
}

/// Errors raised by transport and adapters.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transient network failure (connect error, 503, 504). Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// 429 from the upstream. Retryable, honoring `Retry-After` when given.
    #[error("rate limited{}", .retry_after.map(|s| format!(" (retry after {}s)", s)).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    /// 4xx other than 429. Not retryable; retrying cannot help.
    #[error("client error: HTTP {status}")]
    Client { status: u16 },

    /// The service's circuit is open; no network attempt was made.
    #[error("circuit open for {0}")]
    CircuitOpen(SourceId),

    /// Malformed upstream payload.
    #[error("parse error: {0}")]
    Parse(String),

    /// A single attempt exceeded its timeout window.
    #[error("timeout calling {service}")]
    Timeout { service: SourceId },

    /// Retries exhausted; carries the service and the last failure.
    #[error("{service}: retries exhausted: {cause}")]
    Exhausted {
        service: SourceId,
        cause: Box<SourceError>,
    },

    /// Unexpected API-level error (e.g. a 5xx outside the retryable set).
    #[error("api error: {0}")]
    Api(String),
}

/// How one adapter's contribution to a fan-out ended.
///
/// Distinguishes "the source legitimately found nothing" (`Ok` with an empty
/// list) from "the source failed" and "the breaker refused to call it".
#[derive(Debug)]
pub enum SourceOutcome {
    Ok(SourceResults),
    CircuitOpen,
    Failed(SourceError),
}

impl SourceOutcome {
    pub fn from_result(source: SourceId, result: Result<SourceResults, SourceError>) -> Self {
        match result {
            Ok(results) => SourceOutcome::Ok(results),
            Err(SourceError::CircuitOpen(_)) => {
                tracing::warn!(source = source.id(), "skipped, circuit open");
                SourceOutcome::CircuitOpen
            }
            Err(e) => {
                tracing::error!(source = source.id(), error = %e, "source search failed");
                SourceOutcome::Failed(e)
            }
        }
    }

    /// The records and total this source contributes to fusion: empty for
    /// any non-Ok outcome.
    pub fn results(&self) -> SourceResults {
        match self {
            SourceOutcome::Ok(results) => results.clone(),
            _ => SourceResults::default(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SourceOutcome::Ok(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_circuit_open() {
        let outcome = SourceOutcome::from_result(
            SourceId::Pubmed,
            Err(SourceError::CircuitOpen(SourceId::Pubmed)),
        );
        assert!(matches!(outcome, SourceOutcome::CircuitOpen));
        assert_eq!(outcome.results().records.len(), 0);
        assert_eq!(outcome.results().total, 0);
    }

    #[test]
    fn test_outcome_from_failure() {
        let outcome = SourceOutcome::from_result(
            SourceId::Openalex,
            Err(SourceError::Network("boom".into())),
        );
        assert!(!outcome.is_ok());
        assert_eq!(outcome.results().total, 0);
    }

    #[test]
    fn test_error_display_carries_service() {
        let err = SourceError::Exhausted {
            service: SourceId::SemanticScholar,
            cause: Box::new(SourceError::RateLimited { retry_after: Some(7) }),
        };
        let text = err.to_string();
        assert!(text.contains("semantic_scholar"));
        assert!(text.contains("retry after 7s"));
    }
}
