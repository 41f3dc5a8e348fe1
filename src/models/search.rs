//! Search request and response models.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::augment::AugmentedQuery;
use crate::evidence::StudyType;
use crate::models::{SourceId, UnifiedRecord};

/// Sort field for fused search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Rerank score when present, otherwise fused RRF score. The default.
    Relevance,
    Citations,
    Year,
    EvidenceLevel,
}

impl Default for SortBy {
    fn default() -> Self {
        SortBy::Relevance
    }
}

/// Filters applied after fusion, before pagination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    /// Allow-list of canonical study types; empty means no restriction.
    #[serde(default)]
    pub study_types: Vec<StudyType>,
    #[serde(default)]
    pub open_access_only: bool,
    /// Which sources to fan out to; empty means all.
    #[serde(default)]
    pub sources: Vec<SourceId>,
}

/// One federated search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    /// Per-source query overrides; when unset the raw (or augmented) query
    /// is used.
    pub pubmed_query: Option<String>,
    pub semantic_scholar_query: Option<String>,
    pub open_alex_query: Option<String>,

    #[serde(default)]
    pub filters: SearchFilters,

    /// Zero-based page index.
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    #[serde(default)]
    pub sort: SortBy,

    /// Whether to run query augmentation before fan-out.
    #[serde(default)]
    pub augment: bool,
}

fn default_per_page() -> usize {
    20
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            pubmed_query: None,
            semantic_scholar_query: None,
            open_alex_query: None,
            filters: SearchFilters::default(),
            page: 0,
            per_page: default_per_page(),
            sort: SortBy::default(),
            augment: false,
        }
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn sources(mut self, sources: Vec<SourceId>) -> Self {
        self.filters.sources = sources;
        self
    }

    pub fn years(mut self, start: Option<i32>, end: Option<i32>) -> Self {
        self.filters.year_start = start;
        self.filters.year_end = end;
        self
    }

    pub fn study_types(mut self, types: Vec<StudyType>) -> Self {
        self.filters.study_types = types;
        self
    }

    pub fn open_access_only(mut self, only: bool) -> Self {
        self.filters.open_access_only = only;
        self
    }

    pub fn sort(mut self, sort: SortBy) -> Self {
        self.sort = sort;
        self
    }

    /// The sources this request fans out to.
    pub fn selected_sources(&self) -> Vec<SourceId> {
        if self.filters.sources.is_empty() {
            SourceId::all().to_vec()
        } else {
            self.filters.sources.clone()
        }
    }
}

/// Per-adapter per-request knobs, derived from the [`SearchRequest`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub per_page: usize,
    pub page: usize,
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    pub open_access_only: bool,
}

impl SearchOptions {
    pub fn from_request(request: &SearchRequest) -> Self {
        Self {
            per_page: request.per_page,
            page: request.page,
            year_start: request.filters.year_start,
            year_end: request.filters.year_end,
            open_access_only: request.filters.open_access_only,
        }
    }
}

/// What one adapter returned for one request.
#[derive(Debug, Clone, Default)]
pub struct SourceResults {
    pub records: Vec<UnifiedRecord>,
    /// The source's own reported total, which may exceed the page returned.
    pub total: usize,
}

/// The fused, filtered, paginated response returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub results: Vec<UnifiedRecord>,

    /// Approximate total: the maximum of the per-source reported totals. An
    /// exact fused total is not knowable without exhaustively paging every
    /// source.
    pub total: usize,

    pub page: usize,
    pub per_page: usize,

    /// Local heuristic: whether the filtered set filled the requested page.
    pub has_more: bool,

    /// Per-source result counts; a zero reveals a degraded or empty source.
    pub source_counts: HashMap<SourceId, usize>,

    /// Present when query augmentation ran.
    pub augmented_queries: Option<AugmentedQuery>,
}
