//! Search pipeline: augment, fan out, fuse, rerank, filter, sort, paginate.
//!
//! Adapter tasks run independently; one slow or failed source never blocks
//! the others, and the whole fan-out is bounded by an overall deadline on
//! top of each adapter's per-attempt timeouts. The pipeline fails only when
//! every selected source failed; any partial result is a success.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::augment::{AugmentedQuery, QueryAugmenter};
use crate::config::Config;
use crate::fusion::RankFusion;
use crate::models::{
    SearchOptions, SearchRequest, SearchResults, SortBy, SourceId, UnifiedRecord,
};
use crate::rerank::Reranker;
use crate::sources::{SourceOutcome, SourceRegistry};

/// Augmentation gets a short budget of its own; a slow rewrite must not eat
/// into the search deadline.
const AUGMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sources are queried from offset zero with a window covering every page up
/// to the requested one, so the fused ranking is stable across pages. The
/// window is capped to stay inside upstream page-size limits.
const MAX_FETCH_WINDOW: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Every selected source failed; there is nothing to rank.
    #[error("all sources failed")]
    AllSourcesFailed,
}

/// Orchestrates one federated search end to end.
#[derive(Debug, Clone)]
pub struct SearchPipeline {
    registry: SourceRegistry,
    augmenter: Option<Arc<dyn QueryAugmenter>>,
    reranker: Option<Arc<dyn Reranker>>,
    fusion: RankFusion,
    deadline: Duration,
}

impl SearchPipeline {
    pub fn new(registry: SourceRegistry, config: &Config) -> Self {
        Self {
            registry,
            augmenter: None,
            reranker: None,
            fusion: RankFusion::default(),
            deadline: config.search.deadline(),
        }
    }

    pub fn with_augmenter(mut self, augmenter: Arc<dyn QueryAugmenter>) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Run one search request through the full pipeline.
    pub async fn run(&self, request: &SearchRequest) -> Result<SearchResults, PipelineError> {
        let augmented = self.augment(request).await;
        let opts = fetch_options(request);

        let outcomes = self.fan_out(request, augmented.as_ref(), &opts).await;
        if outcomes.iter().all(|(_, o)| matches!(o, SourceOutcome::Failed(_))) {
            return Err(PipelineError::AllSourcesFailed);
        }

        let mut source_counts = HashMap::new();
        let mut total = 0;
        let mut lists = Vec::with_capacity(outcomes.len());
        for (source, outcome) in outcomes {
            let results = outcome.results();
            source_counts.insert(source, results.total);
            total = total.max(results.total);
            lists.push((source, results.records));
        }

        let fused = self.fusion.fuse(lists);
        let mut reranked = self.rerank(&request.query, fused).await;

        // Merging can change a record's study type after its level was
        // assigned; re-derive so the two never disagree.
        for record in &mut reranked {
            record.evidence_level = crate::evidence::EvidenceLevel::from_study_type(record.study_type);
        }

        let mut filtered = apply_filters(reranked, request);
        sort_records(&mut filtered, request.sort);

        let has_more = filtered.len() >= request.per_page;
        let results = paginate(filtered, request.page, request.per_page);

        Ok(SearchResults {
            results,
            total,
            page: request.page,
            per_page: request.per_page,
            has_more,
            source_counts,
            augmented_queries: augmented,
        })
    }

    /// Best-effort query augmentation under its own timeout.
    async fn augment(&self, request: &SearchRequest) -> Option<AugmentedQuery> {
        if !request.augment {
            return None;
        }
        let augmenter = self.augmenter.as_ref()?;
        match tokio::time::timeout(AUGMENT_TIMEOUT, augmenter.augment(&request.query)).await {
            Ok(Ok(augmented)) => Some(augmented),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "augmentation failed, using raw query");
                None
            }
            Err(_) => {
                tracing::warn!("augmentation timed out, using raw query");
                None
            }
        }
    }

    /// One task per selected adapter; wait for all to settle under the
    /// overall deadline.
    async fn fan_out(
        &self,
        request: &SearchRequest,
        augmented: Option<&AugmentedQuery>,
        opts: &SearchOptions,
    ) -> Vec<(SourceId, SourceOutcome)> {
        let sources = self.registry.select(&request.selected_sources());

        let tasks: Vec<_> = sources
            .into_iter()
            .map(|adapter| {
                let id = adapter.id();
                let query = query_for(id, request, augmented);
                let opts = opts.clone();
                let deadline = self.deadline;
                tokio::spawn(async move {
                    let result =
                        match tokio::time::timeout(deadline, adapter.search(&query, &opts)).await {
                            Ok(result) => result,
                            Err(_) => Err(crate::sources::SourceError::Timeout { service: id }),
                        };
                    (id, SourceOutcome::from_result(id, result))
                })
            })
            .collect();

        join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "source task panicked");
                    None
                }
            })
            .collect()
    }

    /// Score the fused list with the configured reranker, if any. Failure or
    /// absence keeps the fused order.
    async fn rerank(&self, query: &str, mut records: Vec<UnifiedRecord>) -> Vec<UnifiedRecord> {
        let Some(reranker) = &self.reranker else {
            return records;
        };
        if records.is_empty() {
            return records;
        }

        let documents: Vec<String> = records.iter().map(|r| r.rerank_document()).collect();
        match reranker.rerank(query, &documents).await {
            Ok(scores) if scores.len() == records.len() => {
                for (record, score) in records.iter_mut().zip(scores) {
                    record.rerank_score = Some(score);
                }
                records
            }
            Ok(scores) => {
                tracing::warn!(
                    expected = records.len(),
                    got = scores.len(),
                    "reranker returned misaligned scores, keeping fused order"
                );
                records
            }
            Err(e) => {
                tracing::warn!(error = %e, "rerank failed, keeping fused order");
                records
            }
        }
    }
}

/// Options sent to every adapter: always fetch from the start, with a window
/// deep enough to cover the requested page after fusion.
fn fetch_options(request: &SearchRequest) -> SearchOptions {
    let window = (request.page + 1) * request.per_page;
    let mut opts = SearchOptions::from_request(request);
    opts.page = 0;
    opts.per_page = window.min(MAX_FETCH_WINDOW);
    opts
}

/// Pick the query for one source: explicit override, then augmented rewrite,
/// then the raw query.
fn query_for(source: SourceId, request: &SearchRequest, augmented: Option<&AugmentedQuery>) -> String {
    let override_query = match source {
        SourceId::Pubmed => request.pubmed_query.as_deref(),
        SourceId::SemanticScholar => request.semantic_scholar_query.as_deref(),
        SourceId::Openalex => request.open_alex_query.as_deref(),
        SourceId::ClinicalTrials => None,
    };
    if let Some(query) = override_query {
        return query.to_string();
    }
    if let Some(augmented) = augmented {
        let rewritten = match source {
            SourceId::Pubmed => &augmented.pubmed_query,
            SourceId::SemanticScholar => &augmented.semantic_scholar_query,
            SourceId::Openalex => &augmented.open_alex_query,
            SourceId::ClinicalTrials => &augmented.semantic_scholar_query,
        };
        if !rewritten.is_empty() {
            return rewritten.clone();
        }
    }
    request.query.clone()
}

/// Study-type allow-list, open-access flag, and a year-range re-check for
/// sources whose own date filtering is unreliable.
fn apply_filters(records: Vec<UnifiedRecord>, request: &SearchRequest) -> Vec<UnifiedRecord> {
    let filters = &request.filters;
    records
        .into_iter()
        .filter(|r| {
            if !filters.study_types.is_empty() && !filters.study_types.contains(&r.study_type) {
                return false;
            }
            if filters.open_access_only && !r.is_open_access {
                return false;
            }
            // Records with an unknown year pass; dropping them would punish
            // sources with sparse metadata.
            if r.year != 0 {
                if let Some(start) = filters.year_start {
                    if r.year < start {
                        return false;
                    }
                }
                if let Some(end) = filters.year_end {
                    if r.year > end {
                        return false;
                    }
                }
            }
            true
        })
        .collect()
}

fn relevance(record: &UnifiedRecord) -> f64 {
    record
        .rerank_score
        .map(|s| s as f64)
        .or(record.rrf_score)
        .unwrap_or(0.0)
}

fn sort_records(records: &mut [UnifiedRecord], sort: SortBy) {
    match sort {
        SortBy::Relevance => {
            records.sort_by(|a, b| relevance(b).total_cmp(&relevance(a)));
        }
        SortBy::Citations => {
            records.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
        }
        SortBy::Year => {
            records.sort_by(|a, b| b.year.cmp(&a.year));
        }
        SortBy::EvidenceLevel => {
            records.sort_by(|a, b| {
                a.evidence_level
                    .ordinal()
                    .cmp(&b.evidence_level.ordinal())
                    .then_with(|| relevance(b).total_cmp(&relevance(a)))
            });
        }
    }
}

fn paginate(records: Vec<UnifiedRecord>, page: usize, per_page: usize) -> Vec<UnifiedRecord> {
    records
        .into_iter()
        .skip(page * per_page)
        .take(per_page)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EvidenceLevel, StudyType};
    use crate::models::RecordBuilder;

    fn record(title: &str, year: i32) -> UnifiedRecord {
        RecordBuilder::new(title, SourceId::Pubmed)
            .doi(format!("10.1/{}", title.to_lowercase().replace(' ', "-")))
            .year(year)
            .build()
    }

    #[test]
    fn test_fetch_window_deepens_with_page() {
        let request = SearchRequest::new("q")
            .per_page(20)
            .page(2)
            .years(Some(2019), None)
            .open_access_only(true);
        let opts = fetch_options(&request);
        assert_eq!(opts.page, 0);
        assert_eq!(opts.per_page, 60);
        // remaining knobs come straight from the request
        assert_eq!(opts.year_start, Some(2019));
        assert!(opts.open_access_only);

        let deep = SearchRequest::new("q").per_page(50).page(9);
        assert_eq!(fetch_options(&deep).per_page, MAX_FETCH_WINDOW);
    }

    #[test]
    fn test_query_for_prefers_override_then_augmented() {
        let mut request = SearchRequest::new("raw query");
        request.pubmed_query = Some("override[MeSH]".to_string());

        let augmented = AugmentedQuery {
            pubmed_query: "augmented[MeSH]".to_string(),
            semantic_scholar_query: "semantic rewrite".to_string(),
            open_alex_query: String::new(),
            suggested_filters: Default::default(),
        };

        assert_eq!(
            query_for(SourceId::Pubmed, &request, Some(&augmented)),
            "override[MeSH]"
        );
        assert_eq!(
            query_for(SourceId::SemanticScholar, &request, Some(&augmented)),
            "semantic rewrite"
        );
        // empty rewrite falls through to the raw query
        assert_eq!(
            query_for(SourceId::Openalex, &request, Some(&augmented)),
            "raw query"
        );
        assert_eq!(query_for(SourceId::Openalex, &request, None), "raw query");
    }

    #[test]
    fn test_year_post_filter_keeps_unknown_years() {
        let request = SearchRequest::new("q").years(Some(2020), Some(2022));
        let records = vec![
            record("In Range", 2021),
            record("Too Old", 2015),
            record("Too New", 2024),
            record("Unknown Year", 0),
        ];
        let filtered = apply_filters(records, &request);
        let titles: Vec<_> = filtered.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["In Range", "Unknown Year"]);
    }

    #[test]
    fn test_study_type_and_open_access_filters() {
        let rct = RecordBuilder::new("RCT", SourceId::Pubmed)
            .study_type(StudyType::Rct)
            .open_access(true)
            .build();
        let review = RecordBuilder::new("Review", SourceId::Pubmed)
            .study_type(StudyType::Review)
            .open_access(false)
            .build();

        let request = SearchRequest::new("q")
            .study_types(vec![StudyType::Rct])
            .open_access_only(true);
        let filtered = apply_filters(vec![rct, review], &request);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].title, "RCT");
    }

    #[test]
    fn test_sort_by_relevance_prefers_rerank_score() {
        let mut low_rrf_high_rerank = record("Reranked Up", 2020);
        low_rrf_high_rerank.rrf_score = Some(0.01);
        low_rrf_high_rerank.rerank_score = Some(0.99);

        let mut high_rrf = record("Fused High", 2020);
        high_rrf.rrf_score = Some(0.05);

        let mut records = vec![high_rrf, low_rrf_high_rerank];
        sort_records(&mut records, SortBy::Relevance);
        assert_eq!(records[0].title, "Reranked Up");
    }

    #[test]
    fn test_sort_by_evidence_level() {
        let meta = RecordBuilder::new("Meta", SourceId::Pubmed)
            .study_type(StudyType::MetaAnalysis)
            .build();
        let case = RecordBuilder::new("Case", SourceId::Pubmed)
            .study_type(StudyType::CaseReport)
            .build();
        let rct = RecordBuilder::new("Rct", SourceId::Pubmed)
            .study_type(StudyType::Rct)
            .build();

        let mut records = vec![case, rct, meta];
        sort_records(&mut records, SortBy::EvidenceLevel);
        let levels: Vec<_> = records.iter().map(|r| r.evidence_level).collect();
        assert_eq!(
            levels,
            vec![EvidenceLevel::I, EvidenceLevel::II, EvidenceLevel::IV]
        );
    }

    #[test]
    fn test_paginate_slices_fused_list() {
        let records: Vec<_> = (0..25).map(|i| record(&format!("P{}", i), 2020)).collect();
        let page = paginate(records.clone(), 1, 10);
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].title, "P10");

        let last = paginate(records, 2, 10);
        assert_eq!(last.len(), 5);
    }
}
