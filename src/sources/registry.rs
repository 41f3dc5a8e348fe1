//! Registry wiring source adapters to their shared infrastructure.
//!
//! The registry owns one HTTP client, one circuit breaker per source and the
//! PubMed key rotator, and hands out the adapters behind the [`SearchSource`]
//! trait.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    ClinicalTrialsSource, OpenAlexSource, PubMedSource, SearchSource, SemanticScholarSource,
};
use crate::config::Config;
use crate::models::SourceId;
use crate::utils::{CircuitBreaker, HttpClient, KeyRotator};

/// Registry of all available search sources.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: HashMap<SourceId, Arc<dyn SearchSource>>,
}

impl SourceRegistry {
    /// Build the registry from configuration, wiring every adapter.
    pub fn from_config(config: &Config) -> Self {
        let client = HttpClient::new();
        let breaker = |service| {
            Arc::new(CircuitBreaker::new(
                service,
                config.breaker.failure_threshold,
                config.breaker.reset_timeout(),
            ))
        };

        let mut registry = Self {
            sources: HashMap::new(),
        };

        registry.register(Arc::new(PubMedSource::new(
            client.clone(),
            breaker(SourceId::Pubmed),
            Arc::new(KeyRotator::new(config.api_keys.pubmed.clone())),
        )));
        registry.register(Arc::new(SemanticScholarSource::new(
            client.clone(),
            breaker(SourceId::SemanticScholar),
            config.api_keys.semantic_scholar.clone(),
        )));
        registry.register(Arc::new(OpenAlexSource::new(
            client.clone(),
            breaker(SourceId::Openalex),
            config.openalex.mailto.clone(),
        )));
        registry.register(Arc::new(ClinicalTrialsSource::new(
            client,
            breaker(SourceId::ClinicalTrials),
        )));

        registry
    }

    /// Register a source, replacing any previous adapter for the same ID.
    pub fn register(&mut self, source: Arc<dyn SearchSource>) {
        self.sources.insert(source.id(), source);
    }

    /// Get a source by ID.
    pub fn get(&self, id: SourceId) -> Option<&Arc<dyn SearchSource>> {
        self.sources.get(&id)
    }

    /// Get all registered sources.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn SearchSource>> {
        self.sources.values()
    }

    /// Sources matching a selection, skipping IDs with no registered adapter.
    pub fn select(&self, ids: &[SourceId]) -> Vec<Arc<dyn SearchSource>> {
        ids.iter()
            .filter_map(|id| self.sources.get(id).cloned())
            .collect()
    }

    /// Check if a source exists.
    pub fn has(&self, id: SourceId) -> bool {
        self.sources.contains_key(&id)
    }

    /// Get the number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_wires_all_sources() {
        let registry = SourceRegistry::from_config(&Config::default());

        assert_eq!(registry.len(), 4);
        for id in SourceId::all() {
            assert!(registry.has(id), "source '{}' should be registered", id.id());
            assert_eq!(registry.get(id).unwrap().id(), id);
        }
    }

    #[test]
    fn test_select_skips_unregistered() {
        let mut registry = SourceRegistry::from_config(&Config::default());
        registry.sources.remove(&SourceId::ClinicalTrials);

        let selected = registry.select(&[SourceId::Pubmed, SourceId::ClinicalTrials]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id(), SourceId::Pubmed);
    }
}
