//! Core data models for unified records and search operations.

mod record;
mod search;

pub use record::{RecordBuilder, SourceId, UnifiedRecord};
pub use search::{
    SearchFilters, SearchOptions, SearchRequest, SearchResults, SortBy, SourceResults,
};
