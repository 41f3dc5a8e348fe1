//! PubMed source adapter using the NCBI E-utilities API.
//!
//! Two-step protocol: `esearch` returns a PMID list for the query (respecting
//! `retstart`/`retmax` for pagination), then a single batched `efetch` call
//! returns one XML blob for all PMIDs. The blob is split into per-article
//! chunks before parsing so one malformed `<PubmedArticle>` cannot abort the
//! rest of the batch.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use crate::evidence::{derive_study_type, map_pubmed_publication_type};
use crate::models::{RecordBuilder, SearchOptions, SourceId, SourceResults, UnifiedRecord};
use crate::sources::{SearchSource, SourceError};
use crate::utils::{resilient_request, CircuitBreaker, HttpClient, KeyRotator, RequestOptions};

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// PubMed adapter over NCBI E-utilities.
#[derive(Debug)]
pub struct PubMedSource {
    client: HttpClient,
    breaker: Arc<CircuitBreaker>,
    rotator: Arc<KeyRotator>,
    base_url: String,
}

impl PubMedSource {
    pub fn new(
        client: HttpClient,
        breaker: Arc<CircuitBreaker>,
        rotator: Arc<KeyRotator>,
    ) -> Self {
        Self {
            client,
            breaker,
            rotator,
            base_url: EUTILS_BASE.to_string(),
        }
    }

    /// Point the adapter at a different E-utilities endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_search_url(&self, query: &str, opts: &SearchOptions) -> String {
        let retstart = opts.page * opts.per_page;
        let mut url = format!(
            "{}/esearch.fcgi?db=pubmed&term={}&retmax={}&retstart={}&retmode=json",
            self.base_url,
            urlencoding::encode(query),
            opts.per_page,
            retstart
        );
        if opts.year_start.is_some() || opts.year_end.is_some() {
            let min = opts.year_start.unwrap_or(1900);
            let max = opts.year_end.unwrap_or(9999);
            url.push_str(&format!("&mindate={}&maxdate={}&datetype=pdat", min, max));
        }
        url
    }

    fn build_fetch_url(&self, pmids: &[String]) -> String {
        format!(
            "{}/efetch.fcgi?db=pubmed&id={}&rettype=xml&retmode=xml",
            self.base_url,
            pmids.join(",")
        )
    }

    /// Append the next rotated API key, if any are configured.
    fn with_api_key(&self, url: &str) -> String {
        match self.rotator.next() {
            Some(key) => format!("{}&api_key={}", url, urlencoding::encode(&key)),
            None => url.to_string(),
        }
    }

    async fn search_inner(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SourceResults, SourceError> {
        let request_opts = RequestOptions::for_service(SourceId::Pubmed);
        let search_url = self.build_search_url(query, opts);

        // The builder closure runs per attempt, so a 429 retry picks up the
        // next key in rotation.
        let response = resilient_request(&request_opts, || {
            self.client.get(&self.with_api_key(&search_url))
        })
        .await?;
        let search: ESearchEnvelope = response.json().await.map_err(|e| {
            SourceError::Parse(format!("esearch response: {}", e))
        })?;

        let pmids = search.esearchresult.idlist;
        let total = search
            .esearchresult
            .count
            .parse::<usize>()
            .unwrap_or(pmids.len());

        if pmids.is_empty() {
            return Ok(SourceResults {
                records: Vec::new(),
                total: 0,
            });
        }

        let fetch_url = self.build_fetch_url(&pmids);
        let response = resilient_request(&request_opts, || {
            self.client.get(&self.with_api_key(&fetch_url))
        })
        .await?;
        let xml = response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("reading efetch body: {}", e)))?;

        Ok(SourceResults {
            records: parse_article_set(&xml),
            total,
        })
    }
}

#[async_trait]
impl SearchSource for PubMedSource {
    fn id(&self) -> SourceId {
        SourceId::Pubmed
    }

    async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SourceResults, SourceError> {
        if !self.breaker.can_request() {
            return Err(SourceError::CircuitOpen(SourceId::Pubmed));
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

// ===== E-utilities wire shapes =====

#[derive(Debug, Deserialize)]
struct ESearchEnvelope {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(default)]
    count: String,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedArticle {
    MedlineCitation: Option<MedlineCitation>,
    PubmedData: Option<PubmedData>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MedlineCitation {
    PMID: Option<TextNode>,
    Article: Option<Article>,
    MeshHeadingList: Option<MeshHeadingList>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Article {
    Journal: Option<Journal>,
    ArticleTitle: Option<TextNode>,
    Abstract: Option<Abstract>,
    AuthorList: Option<AuthorList>,
    PublicationTypeList: Option<PublicationTypeList>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Journal {
    Title: Option<TextNode>,
    ISOAbbreviation: Option<TextNode>,
    JournalIssue: Option<JournalIssue>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JournalIssue {
    PubDate: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubDate {
    Year: Option<String>,
    MedlineDate: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Abstract {
    #[serde(rename = "AbstractText", default)]
    sections: Vec<AbstractText>,
}

#[derive(Debug, Deserialize)]
struct AbstractText {
    #[serde(rename = "@Label")]
    label: Option<String>,
    #[serde(rename = "$text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct AuthorList {
    #[serde(rename = "Author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Author {
    LastName: Option<TextNode>,
    ForeName: Option<TextNode>,
    CollectiveName: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PublicationTypeList {
    #[serde(rename = "PublicationType", default)]
    types: Vec<TextNode>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MeshHeadingList {
    #[serde(rename = "MeshHeading", default)]
    headings: Vec<MeshHeading>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MeshHeading {
    DescriptorName: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedData {
    ArticleIdList: Option<ArticleIdList>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct ArticleIdList {
    #[serde(rename = "ArticleId", default)]
    ids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    #[serde(rename = "@IdType")]
    id_type: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text")]
    text: Option<String>,
}

impl TextNode {
    fn get(&self) -> String {
        self.text.clone().unwrap_or_default()
    }
}

/// Split an efetch blob into `<PubmedArticle>` chunks and parse each one in
/// isolation; a chunk that fails to parse is logged and skipped.
fn parse_article_set(xml: &str) -> Vec<UnifiedRecord> {
    let chunker =
        Regex::new(r"(?s)<PubmedArticle>.*?</PubmedArticle>").expect("static regex is valid");

    let mut records = Vec::new();
    for chunk in chunker.find_iter(xml) {
        match quick_xml::de::from_str::<PubmedArticle>(chunk.as_str()) {
            Ok(article) => {
                if let Some(record) = map_article(article) {
                    records.push(record);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed PubmedArticle");
            }
        }
    }
    records
}

/// Four-digit year from a `<Year>` or `<MedlineDate>` value.
fn extract_year(pub_date: &PubDate) -> i32 {
    let raw = pub_date
        .Year
        .as_deref()
        .or(pub_date.MedlineDate.as_deref())
        .unwrap_or("");
    let digits = Regex::new(r"\d{4}").expect("static regex is valid");
    digits
        .find(raw)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn map_article(article: PubmedArticle) -> Option<UnifiedRecord> {
    let citation = article.MedlineCitation?;
    let body = citation.Article.as_ref();

    let title = body
        .and_then(|a| a.ArticleTitle.as_ref())
        .map(|t| t.get())
        .unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    let pmid = citation.PMID.as_ref().map(|p| p.get()).unwrap_or_default();

    // Structured abstracts keep their section labels as prefixes.
    let abstract_text = body
        .and_then(|a| a.Abstract.as_ref())
        .map(|ab| {
            ab.sections
                .iter()
                .filter_map(|section| {
                    let text = section.text.as_deref()?.trim().to_string();
                    if text.is_empty() {
                        return None;
                    }
                    Some(match &section.label {
                        Some(label) => format!("{}: {}", label, text),
                        None => text,
                    })
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let authors: Vec<String> = body
        .and_then(|a| a.AuthorList.as_ref())
        .map(|list| {
            list.authors
                .iter()
                .filter_map(|author| {
                    if let Some(collective) = &author.CollectiveName {
                        return Some(collective.get());
                    }
                    let last = author.LastName.as_ref()?.get();
                    match &author.ForeName {
                        Some(fore) => Some(format!("{} {}", last, fore.get())),
                        None => Some(last),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let journal = body
        .and_then(|a| a.Journal.as_ref())
        .map(|j| {
            j.ISOAbbreviation
                .as_ref()
                .or(j.Title.as_ref())
                .map(|t| t.get())
                .unwrap_or_default()
        })
        .unwrap_or_default();

    let year = body
        .and_then(|a| a.Journal.as_ref())
        .and_then(|j| j.JournalIssue.as_ref())
        .and_then(|ji| ji.PubDate.as_ref())
        .map(extract_year)
        .unwrap_or(0);

    let doi = article
        .PubmedData
        .as_ref()
        .and_then(|pd| pd.ArticleIdList.as_ref())
        .and_then(|list| {
            list.ids
                .iter()
                .find(|id| id.id_type.as_deref() == Some("doi"))
        })
        .and_then(|id| id.value.clone())
        .unwrap_or_default();

    let publication_types: Vec<String> = body
        .and_then(|a| a.PublicationTypeList.as_ref())
        .map(|list| list.types.iter().map(|t| t.get()).collect())
        .unwrap_or_default();

    let mesh_terms: Vec<String> = citation
        .MeshHeadingList
        .as_ref()
        .map(|list| {
            list.headings
                .iter()
                .filter_map(|h| h.DescriptorName.as_ref().map(|d| d.get()))
                .collect()
        })
        .unwrap_or_default();

    let study_type = derive_study_type(&publication_types, map_pubmed_publication_type);

    Some(
        RecordBuilder::new(title, SourceId::Pubmed)
            .pmid(pmid)
            .doi(doi)
            .authors(authors)
            .journal(journal)
            .year(year)
            .abstract_text(abstract_text)
            .publication_types(publication_types)
            .mesh_terms(mesh_terms)
            .study_type(study_type)
            .build(),
    )
}
