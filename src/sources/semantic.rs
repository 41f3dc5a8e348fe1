//! Semantic Scholar source adapter (Graph API `/paper/search`).

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::evidence::{derive_study_type, map_s2_publication_type};
use crate::models::{RecordBuilder, SearchOptions, SourceId, SourceResults, UnifiedRecord};
use crate::sources::{SearchSource, SourceError};
use crate::utils::{resilient_request, CircuitBreaker, HttpClient, RequestOptions};

const S2_BASE: &str = "https://api.semanticscholar.org/graph/v1";

const S2_FIELDS: &str = "title,abstract,authors,year,venue,citationCount,\
influentialCitationCount,referenceCount,externalIds,publicationTypes,\
isOpenAccess,openAccessPdf,tldr,fieldsOfStudy";

#[derive(Debug)]
pub struct SemanticScholarSource {
    client: HttpClient,
    breaker: Arc<CircuitBreaker>,
    api_key: Option<String>,
    base_url: String,
}

impl SemanticScholarSource {
    pub fn new(client: HttpClient, breaker: Arc<CircuitBreaker>, api_key: Option<String>) -> Self {
        Self {
            client,
            breaker,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: S2_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_url(&self, query: &str, opts: &SearchOptions) -> String {
        let mut url = format!(
            "{}/paper/search?query={}&offset={}&limit={}&fields={}",
            self.base_url,
            urlencoding::encode(query),
            opts.page * opts.per_page,
            opts.per_page,
            S2_FIELDS
        );
        match (opts.year_start, opts.year_end) {
            (Some(start), Some(end)) => url.push_str(&format!("&year={}-{}", start, end)),
            (Some(start), None) => url.push_str(&format!("&year={}-", start)),
            (None, Some(end)) => url.push_str(&format!("&year=-{}", end)),
            (None, None) => {}
        }
        if opts.open_access_only {
            url.push_str("&openAccessPdf");
        }
        url
    }

    async fn search_inner(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SourceResults, SourceError> {
        let request_opts = RequestOptions::for_service(SourceId::SemanticScholar);
        let url = self.build_url(query, opts);

        let response = resilient_request(&request_opts, || {
            let builder = self.client.get(&url);
            match &self.api_key {
                Some(key) => builder.header("x-api-key", key),
                None => builder,
            }
        })
        .await?;

        let body: S2SearchResponse = response.json().await.map_err(|e| {
            SourceError::Parse(format!("paper/search response: {}", e))
        })?;

        let records = body.data.into_iter().filter_map(map_paper).collect();
        Ok(SourceResults {
            records,
            total: body.total,
        })
    }
}

#[async_trait]
impl SearchSource for SemanticScholarSource {
    fn id(&self) -> SourceId {
        SourceId::SemanticScholar
    }

    async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SourceResults, SourceError> {
        if !self.breaker.can_request() {
            return Err(SourceError::CircuitOpen(SourceId::SemanticScholar));
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

// ===== Graph API wire shapes =====

#[derive(Debug, Deserialize)]
struct S2SearchResponse {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    r#abstract: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    citation_count: Option<u32>,
    influential_citation_count: Option<u32>,
    reference_count: Option<u32>,
    #[serde(default)]
    authors: Vec<S2Author>,
    external_ids: Option<S2ExternalIds>,
    #[serde(default)]
    publication_types: Option<Vec<String>>,
    is_open_access: Option<bool>,
    open_access_pdf: Option<S2OpenAccessPdf>,
    tldr: Option<S2Tldr>,
    fields_of_study: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "PubMed")]
    pubmed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2OpenAccessPdf {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Tldr {
    text: Option<String>,
}

fn map_paper(paper: S2Paper) -> Option<UnifiedRecord> {
    let title = paper.title.unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    let publication_types = paper.publication_types.unwrap_or_default();
    let study_type = derive_study_type(&publication_types, map_s2_publication_type);

    let authors = paper
        .authors
        .into_iter()
        .filter_map(|a| a.name)
        .collect::<Vec<_>>();

    let (doi, pmid) = match paper.external_ids {
        Some(ids) => (
            ids.doi.unwrap_or_default(),
            ids.pubmed.unwrap_or_default(),
        ),
        None => (String::new(), String::new()),
    };

    let mut builder = RecordBuilder::new(title, SourceId::SemanticScholar)
        .s2_id(paper.paper_id.unwrap_or_default())
        .doi(doi)
        .pmid(pmid)
        .authors(authors)
        .journal(paper.venue.unwrap_or_default())
        .year(paper.year.unwrap_or(0))
        .abstract_text(paper.r#abstract.unwrap_or_default())
        .tldr(paper.tldr.and_then(|t| t.text).unwrap_or_default())
        .citation_count(paper.citation_count.unwrap_or(0))
        .publication_types(publication_types)
        .fields_of_study(paper.fields_of_study.unwrap_or_default())
        .open_access(paper.is_open_access.unwrap_or(false))
        .open_access_pdf_url(
            paper
                .open_access_pdf
                .and_then(|p| p.url)
                .unwrap_or_default(),
        )
        .study_type(study_type);
    if let Some(count) = paper.influential_citation_count {
        builder = builder.influential_citation_count(count);
    }
    if let Some(count) = paper.reference_count {
        builder = builder.reference_count(count);
    }
    Some(builder.build())
}
