//! End-to-end pipeline tests against mocked upstream services.

use std::sync::Arc;

use mockito::{Matcher, Server, ServerGuard};

use litfuse::config::Config;
use litfuse::models::{SearchRequest, SourceId};
use litfuse::pipeline::{PipelineError, SearchPipeline};
use litfuse::sources::{
    OpenAlexSource, PubMedSource, SourceRegistry,
};
use litfuse::utils::{CircuitBreaker, HttpClient, KeyRotator};

const ESEARCH_JSON: &str = r#"{
  "esearchresult": {"count": "2", "idlist": ["1001", "1002"]}
}"#;

const EFETCH_XML: &str = r#"<PubmedArticleSet>
<PubmedArticle>
  <MedlineCitation>
    <PMID>1001</PMID>
    <Article>
      <Journal>
        <ISOAbbreviation>Lancet</ISOAbbreviation>
        <JournalIssue><PubDate><Year>2021</Year></PubDate></JournalIssue>
      </Journal>
      <ArticleTitle>Shared Landmark Trial</ArticleTitle>
      <PublicationTypeList>
        <PublicationType>Randomized Controlled Trial</PublicationType>
      </PublicationTypeList>
    </Article>
  </MedlineCitation>
  <PubmedData>
    <ArticleIdList><ArticleId IdType="doi">10.1016/shared</ArticleId></ArticleIdList>
  </PubmedData>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation>
    <PMID>1002</PMID>
    <Article>
      <Journal>
        <ISOAbbreviation>BMJ</ISOAbbreviation>
        <JournalIssue><PubDate><Year>2020</Year></PubDate></JournalIssue>
      </Journal>
      <ArticleTitle>PubMed Only Study</ArticleTitle>
    </Article>
  </MedlineCitation>
  <PubmedData>
    <ArticleIdList><ArticleId IdType="doi">10.1016/pm-only</ArticleId></ArticleIdList>
  </PubmedData>
</PubmedArticle>
</PubmedArticleSet>"#;

const WORKS_JSON: &str = r#"{
  "meta": {"count": 7},
  "results": [
    {
      "id": "https://openalex.org/W1",
      "doi": "https://doi.org/10.1016/SHARED",
      "title": "Shared Landmark Trial",
      "publication_year": 2021,
      "type": "article",
      "cited_by_count": 300,
      "open_access": {"is_oa": true, "oa_url": "https://example.org/w1.pdf"}
    },
    {
      "id": "https://openalex.org/W2",
      "doi": "https://doi.org/10.1016/oa-only",
      "title": "OpenAlex Only Study",
      "publication_year": 2019,
      "type": "article",
      "cited_by_count": 12
    }
  ]
}"#;

fn pubmed_source(server: &ServerGuard, breaker: Arc<CircuitBreaker>) -> Arc<PubMedSource> {
    Arc::new(
        PubMedSource::new(HttpClient::new(), breaker, Arc::new(KeyRotator::new(vec![])))
            .with_base_url(server.url()),
    )
}

fn openalex_source(server: &ServerGuard) -> Arc<OpenAlexSource> {
    Arc::new(
        OpenAlexSource::new(
            HttpClient::new(),
            Arc::new(CircuitBreaker::default_for(SourceId::Openalex)),
            None,
        )
        .with_base_url(server.url()),
    )
}

fn pipeline_for(registry: SourceRegistry) -> SearchPipeline {
    SearchPipeline::new(registry, &Config::default())
}

#[tokio::test]
async fn two_sources_fuse_and_merge_shared_record() {
    let mut pubmed = Server::new_async().await;
    let mut openalex = Server::new_async().await;

    pubmed
        .mock("GET", Matcher::Regex(r"^/esearch\.fcgi.*".into()))
        .with_status(200)
        .with_body(ESEARCH_JSON)
        .create_async()
        .await;
    pubmed
        .mock("GET", Matcher::Regex(r"^/efetch\.fcgi.*".into()))
        .with_status(200)
        .with_body(EFETCH_XML)
        .create_async()
        .await;
    openalex
        .mock("GET", Matcher::Regex(r"^/works.*".into()))
        .with_status(200)
        .with_body(WORKS_JSON)
        .create_async()
        .await;

    let mut registry = SourceRegistry::from_config(&Config::default());
    registry.register(pubmed_source(
        &pubmed,
        Arc::new(CircuitBreaker::default_for(SourceId::Pubmed)),
    ));
    registry.register(openalex_source(&openalex));

    let request = SearchRequest::new("landmark trial")
        .sources(vec![SourceId::Pubmed, SourceId::Openalex]);
    let results = pipeline_for(registry).run(&request).await.unwrap();

    // 2 + 2 records, one shared identity -> 3 fused
    assert_eq!(results.results.len(), 3);
    assert_eq!(results.total, 7); // max of per-source totals
    assert_eq!(results.source_counts[&SourceId::Pubmed], 2);
    assert_eq!(results.source_counts[&SourceId::Openalex], 7);

    // The DOI-matched record appears once, found by both sources, and the
    // shared appearance puts it first.
    let top = &results.results[0];
    assert_eq!(top.title, "Shared Landmark Trial");
    assert_eq!(top.sources.len(), 2);
    assert_eq!(top.pmid.as_deref(), Some("1001"));
    assert_eq!(top.openalex_id.as_deref(), Some("W1"));
    // PubMed precedence keeps its DOI casing; OpenAlex contributes citations
    assert_eq!(top.doi.as_deref(), Some("10.1016/shared"));
    assert_eq!(top.citation_count, 300);
    assert!(top.is_open_access);
}

#[tokio::test]
async fn open_circuit_skips_source_without_network_calls() {
    let mut pubmed = Server::new_async().await;
    let mut openalex = Server::new_async().await;

    // Any PubMed call would trip these.
    let esearch = pubmed
        .mock("GET", Matcher::Regex(r"^/esearch\.fcgi.*".into()))
        .expect(0)
        .create_async()
        .await;
    let efetch = pubmed
        .mock("GET", Matcher::Regex(r"^/efetch\.fcgi.*".into()))
        .expect(0)
        .create_async()
        .await;
    openalex
        .mock("GET", Matcher::Regex(r"^/works.*".into()))
        .with_status(200)
        .with_body(WORKS_JSON)
        .create_async()
        .await;

    let breaker = Arc::new(CircuitBreaker::default_for(SourceId::Pubmed));
    for _ in 0..5 {
        breaker.on_failure();
    }

    let mut registry = SourceRegistry::from_config(&Config::default());
    registry.register(pubmed_source(&pubmed, breaker));
    registry.register(openalex_source(&openalex));

    let request = SearchRequest::new("landmark trial")
        .sources(vec![SourceId::Pubmed, SourceId::Openalex]);
    let results = pipeline_for(registry).run(&request).await.unwrap();

    // Degraded, not failed: OpenAlex results come through, PubMed reports 0.
    assert_eq!(results.results.len(), 2);
    assert_eq!(results.source_counts[&SourceId::Pubmed], 0);
    assert_eq!(results.source_counts[&SourceId::Openalex], 7);

    esearch.assert_async().await;
    efetch.assert_async().await;
}

#[tokio::test]
async fn all_sources_failing_is_an_error() {
    let mut pubmed = Server::new_async().await;
    pubmed
        .mock("GET", Matcher::Regex(r"^/esearch\.fcgi.*".into()))
        .with_status(400)
        .create_async()
        .await;

    let mut registry = SourceRegistry::from_config(&Config::default());
    registry.register(pubmed_source(
        &pubmed,
        Arc::new(CircuitBreaker::default_for(SourceId::Pubmed)),
    ));

    let request = SearchRequest::new("anything").sources(vec![SourceId::Pubmed]);
    let err = pipeline_for(registry).run(&request).await.unwrap_err();
    assert!(matches!(err, PipelineError::AllSourcesFailed));
}

#[tokio::test]
async fn empty_id_list_short_circuits_fetch() {
    let mut pubmed = Server::new_async().await;
    pubmed
        .mock("GET", Matcher::Regex(r"^/esearch\.fcgi.*".into()))
        .with_status(200)
        .with_body(r#"{"esearchresult": {"count": "0", "idlist": []}}"#)
        .create_async()
        .await;
    let efetch = pubmed
        .mock("GET", Matcher::Regex(r"^/efetch\.fcgi.*".into()))
        .expect(0)
        .create_async()
        .await;

    let mut registry = SourceRegistry::from_config(&Config::default());
    registry.register(pubmed_source(
        &pubmed,
        Arc::new(CircuitBreaker::default_for(SourceId::Pubmed)),
    ));

    let request = SearchRequest::new("no hits at all").sources(vec![SourceId::Pubmed]);
    let results = pipeline_for(registry).run(&request).await.unwrap();

    assert!(results.results.is_empty());
    assert!(!results.has_more);
    assert_eq!(results.source_counts[&SourceId::Pubmed], 0);
    efetch.assert_async().await;
}
