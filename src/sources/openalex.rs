//! OpenAlex source adapter (Works API).
//!
//! OpenAlex ships abstracts as an inverted index (word -> positions); the
//! adapter flattens that back into readable text. Identifiers come back as
//! full URLs and are stripped down to bare IDs before they enter a record.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::evidence::{derive_study_type, map_openalex_type};
use crate::models::{RecordBuilder, SearchOptions, SourceId, SourceResults, UnifiedRecord};
use crate::sources::{SearchSource, SourceError};
use crate::utils::{resilient_request, CircuitBreaker, HttpClient, RequestOptions};

const OPENALEX_BASE: &str = "https://api.openalex.org";

/// Concepts below this relevance score are dropped.
const CONCEPT_SCORE_FLOOR: f64 = 0.3;

#[derive(Debug)]
pub struct OpenAlexSource {
    client: HttpClient,
    breaker: Arc<CircuitBreaker>,
    mailto: Option<String>,
    base_url: String,
}

impl OpenAlexSource {
    pub fn new(client: HttpClient, breaker: Arc<CircuitBreaker>, mailto: Option<String>) -> Self {
        Self {
            client,
            breaker,
            mailto: mailto.filter(|m| !m.trim().is_empty()),
            base_url: OPENALEX_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_url(&self, query: &str, opts: &SearchOptions) -> String {
        // OpenAlex pages are 1-based.
        let mut url = format!(
            "{}/works?search={}&page={}&per-page={}",
            self.base_url,
            urlencoding::encode(query),
            opts.page + 1,
            opts.per_page
        );

        let mut filters = Vec::new();
        if let Some(start) = opts.year_start {
            filters.push(format!("from_publication_date:{}-01-01", start));
        }
        if let Some(end) = opts.year_end {
            filters.push(format!("to_publication_date:{}-12-31", end));
        }
        if opts.open_access_only {
            filters.push("is_oa:true".to_string());
        }
        if !filters.is_empty() {
            url.push_str(&format!("&filter={}", filters.join(",")));
        }

        if let Some(mailto) = &self.mailto {
            url.push_str(&format!("&mailto={}", urlencoding::encode(mailto)));
        }
        url
    }

    async fn search_inner(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SourceResults, SourceError> {
        let request_opts = RequestOptions::for_service(SourceId::Openalex);
        let url = self.build_url(query, opts);

        let response = resilient_request(&request_opts, || self.client.get(&url)).await?;
        let body: WorksResponse = response.json().await.map_err(|e| {
            SourceError::Parse(format!("works response: {}", e))
        })?;

        let records = body.results.into_iter().filter_map(map_work).collect();
        Ok(SourceResults {
            records,
            total: body.meta.map(|m| m.count).unwrap_or(0),
        })
    }
}

#[async_trait]
impl SearchSource for OpenAlexSource {
    fn id(&self) -> SourceId {
        SourceId::Openalex
    }

    async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SourceResults, SourceError> {
        if !self.breaker.can_request() {
            return Err(SourceError::CircuitOpen(SourceId::Openalex));
        }
        match self.search_inner(query, opts).await {
            Ok(results) => {
                self.breaker.on_success();
                Ok(results)
            }
            Err(e) => {
                self.breaker.on_failure();
                Err(e)
            }
        }
    }
}

// ===== Works API wire shapes =====

#[derive(Debug, Deserialize)]
struct WorksResponse {
    meta: Option<WorksMeta>,
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct WorksMeta {
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    #[serde(rename = "type")]
    work_type: Option<String>,
    cited_by_count: Option<u32>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    primary_location: Option<Location>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    ids: Option<WorkIds>,
    #[serde(default)]
    concepts: Vec<Concept>,
    open_access: Option<OpenAccess>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<WorkAuthor>,
}

#[derive(Debug, Deserialize)]
struct WorkAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    source: Option<LocationSource>,
}

#[derive(Debug, Deserialize)]
struct LocationSource {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkIds {
    pmid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Concept {
    display_name: Option<String>,
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenAccess {
    is_oa: Option<bool>,
    oa_url: Option<String>,
}

/// Rebuild plain text from an inverted index: flatten every (word, position)
/// pair, sort by position, join with spaces.
fn reconstruct_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
        .collect();
    positioned.sort_by_key(|&(position, _)| position);
    positioned
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip a URL-form identifier down to its trailing segment.
fn strip_prefix_url(value: &str, prefix: &str) -> String {
    value
        .strip_prefix(prefix)
        .unwrap_or(value)
        .trim_matches('/')
        .to_string()
}

fn map_work(work: Work) -> Option<UnifiedRecord> {
    let title = work
        .title
        .or(work.display_name)
        .unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    let openalex_id = work
        .id
        .as_deref()
        .map(|id| strip_prefix_url(id, "https://openalex.org/"))
        .unwrap_or_default();
    let doi = work
        .doi
        .as_deref()
        .map(|doi| strip_prefix_url(doi, "https://doi.org/"))
        .unwrap_or_default();
    let pmid = work
        .ids
        .as_ref()
        .and_then(|ids| ids.pmid.as_deref())
        .map(|pmid| strip_prefix_url(pmid, "https://pubmed.ncbi.nlm.nih.gov/"))
        .unwrap_or_default();

    let authors: Vec<String> = work
        .authorships
        .into_iter()
        .filter_map(|a| a.author.and_then(|author| author.display_name))
        .collect();

    let journal = work
        .primary_location
        .and_then(|loc| loc.source)
        .and_then(|source| source.display_name)
        .unwrap_or_default();

    let abstract_text = work
        .abstract_inverted_index
        .as_ref()
        .map(reconstruct_abstract)
        .unwrap_or_default();

    let concepts: Vec<String> = work
        .concepts
        .into_iter()
        .filter(|c| c.score.unwrap_or(0.0) > CONCEPT_SCORE_FLOOR)
        .filter_map(|c| c.display_name)
        .collect();

    let type_tags: Vec<String> = work.work_type.into_iter().collect();
    let study_type = derive_study_type(&type_tags, map_openalex_type);

    let (is_oa, oa_url) = match work.open_access {
        Some(oa) => (oa.is_oa.unwrap_or(false), oa.oa_url.unwrap_or_default()),
        None => (false, String::new()),
    };

    Some(
        RecordBuilder::new(title, SourceId::Openalex)
            .openalex_id(openalex_id)
            .doi(doi)
            .pmid(pmid)
            .authors(authors)
            .journal(journal)
            .year(work.publication_year.unwrap_or(0))
            .abstract_text(abstract_text)
            .citation_count(work.cited_by_count.unwrap_or(0))
            .publication_types(type_tags)
            .concepts(concepts)
            .open_access(is_oa)
            .open_access_pdf_url(oa_url)
            .study_type(study_type)
            .build(),
    )
}
