//! ClinicalTrials.gov source adapter (v2 studies API).
//!
//! Trials have no citation graph and no formal publication type, so evidence
//! classification comes from the study design. Interventional designs count
//! as randomized trials; the API's year coverage is uneven, so date-range
//! filtering happens downstream in the pipeline.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use crate::evidence::StudyType;
use crate::models::{RecordBuilder, SearchOptions, SourceId, SourceResults, UnifiedRecord};
use crate::sources::{SearchSource, SourceError};
use crate::utils::{resilient_request, CircuitBreaker, HttpClient, RequestOptions};

const CTGOV_BASE: &str = "https://clinicaltrials.gov/api/v2";

#[derive(Debug)]
pub struct ClinicalTrialsSource {
    client: HttpClient,
    breaker: Arc<CircuitBreaker>,
    base_url: String,
    /// Recruitment statuses (e.g. `RECRUITING`) to restrict results to;
    /// empty means no restriction.
    status_filter: Vec<String>,
}

impl ClinicalTrialsSource {
    pub fn new(client: HttpClient, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client,
            breaker,
            base_url: CTGOV_BASE.to_string(),
            status_filter: Vec::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_status_filter(mut self, statuses: Vec<String>) -> Self {
        self.status_filter = statuses;
        self
    }

    fn build_url(&self, query: &str, opts: &SearchOptions) -> String {
        let mut url = format!(
            "{}/studies?query.term={}&pageSize={}&format=json",
            self.base_url,
            urlencoding::encode(query),
            opts.per_page
        );
        if !self.status_filter.is_empty() {
            url.push_str("&filter.overallStatus=");
            url.push_str(&self.status_filter.join(","));
        }
        url
    }

    async fn search_inner(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SourceResults, SourceError> {
        let request_opts = RequestOptions::for_service(SourceId::ClinicalTrials);
        let url = self.build_url(query, opts);

        let response = resilient_request(&request_opts, || self.client.get(&url)).await?;
        let body: StudiesResponse = response.json().await.map_err(|e| {
            SourceError::Parse(format!("studies response: {}", e))
        })?;

        let records = body.studies.into_iter().filter_map(map_study).collect();
        Ok(SourceResults {
            records,
            total: body.total_count.unwrap_or(0),
        })
    }
}

#[async_trait]
impl SearchSource for ClinicalTrialsSource {
    fn id(&self) -> SourceId {
        SourceId::ClinicalTrials
    }

    async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SourceResults, SourceError> {
        if !self.breaker.can_request() {
            return Err(SourceError::CircuitOpen(SourceId::ClinicalTrials));
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

// ===== v2 API wire shapes =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudiesResponse {
    #[serde(default)]
    studies: Vec<Study>,
    total_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Study {
    protocol_section: Option<ProtocolSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolSection {
    identification_module: Option<IdentificationModule>,
    status_module: Option<StatusModule>,
    description_module: Option<DescriptionModule>,
    design_module: Option<DesignModule>,
    contacts_locations_module: Option<ContactsLocationsModule>,
    conditions_module: Option<ConditionsModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentificationModule {
    nct_id: Option<String>,
    brief_title: Option<String>,
    official_title: Option<String>,
    organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organization {
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusModule {
    overall_status: Option<String>,
    start_date_struct: Option<DateStruct>,
}

#[derive(Debug, Deserialize)]
struct DateStruct {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionModule {
    brief_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DesignModule {
    study_type: Option<String>,
    #[serde(default)]
    phases: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactsLocationsModule {
    #[serde(default)]
    overall_officials: Vec<Official>,
}

#[derive(Debug, Deserialize)]
struct Official {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionsModule {
    #[serde(default)]
    conditions: Vec<String>,
}

/// Study design to canonical study type. Interventional trials are treated
/// as randomized; purely observational registrations stay observational.
fn map_design(design: Option<&DesignModule>) -> StudyType {
    let Some(design) = design else {
        return StudyType::Other;
    };
    match design
        .study_type
        .as_deref()
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "interventional" => StudyType::Rct,
        "observational" => StudyType::Observational,
        _ => StudyType::Other,
    }
}

fn parse_start_year(status: Option<&StatusModule>) -> i32 {
    let raw = status
        .and_then(|s| s.start_date_struct.as_ref())
        .and_then(|d| d.date.as_deref())
        .unwrap_or("");
    let digits = Regex::new(r"\d{4}").expect("static regex is valid");
    digits
        .find(raw)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn map_study(study: Study) -> Option<UnifiedRecord> {
    let proto = study.protocol_section?;
    let ident = proto.identification_module.as_ref();

    let title = ident
        .and_then(|i| i.official_title.clone().or_else(|| i.brief_title.clone()))
        .unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    let nct_id = ident
        .and_then(|i| i.nct_id.clone())
        .unwrap_or_default();
    let organization = ident
        .and_then(|i| i.organization.as_ref())
        .and_then(|o| o.full_name.clone())
        .unwrap_or_else(|| "ClinicalTrials.gov".to_string());

    let status = proto
        .status_module
        .as_ref()
        .and_then(|s| s.overall_status.clone())
        .unwrap_or_default();
    let year = parse_start_year(proto.status_module.as_ref());

    let phases = proto
        .design_module
        .as_ref()
        .map(|d| d.phases.clone())
        .unwrap_or_default();
    let phase_label = phases.join(", ");

    // No abstract exists for a registration; compose one from the summary,
    // phase, and recruitment status.
    let mut abstract_parts = Vec::new();
    if let Some(summary) = proto
        .description_module
        .as_ref()
        .and_then(|d| d.brief_summary.clone())
    {
        abstract_parts.push(summary);
    }
    if !phase_label.is_empty() {
        abstract_parts.push(format!("Phase: {}", phase_label));
    }
    if !status.is_empty() {
        abstract_parts.push(format!("Status: {}", status));
    }

    let authors: Vec<String> = proto
        .contacts_locations_module
        .as_ref()
        .map(|c| {
            c.overall_officials
                .iter()
                .filter_map(|o| o.name.clone())
                .collect()
        })
        .unwrap_or_default();

    let conditions = proto
        .conditions_module
        .as_ref()
        .map(|c| c.conditions.clone())
        .unwrap_or_default();

    let study_type = map_design(proto.design_module.as_ref());

    Some(
        RecordBuilder::new(title, SourceId::ClinicalTrials)
            .nct_id(nct_id)
            .authors(authors)
            .journal(organization)
            .year(year)
            .abstract_text(abstract_parts.join(" | "))
            .publication_types(phases)
            .mesh_terms(conditions)
            .study_type(study_type)
            .trial_status(status)
            .trial_phase(phase_label)
            .open_access(true)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceLevel;
    use mockito::Server;

    const STUDY_JSON: &str = r#"{
      "totalCount": 3,
      "studies": [{
        "protocolSection": {
          "identificationModule": {
            "nctId": "NCT04157751",
            "briefTitle": "Short Title",
            "officialTitle": "A Randomized Trial of Something Important",
            "organization": {"fullName": "Mayo Clinic"}
          },
          "statusModule": {
            "overallStatus": "RECRUITING",
            "startDateStruct": {"date": "2022-05-01"}
          },
          "descriptionModule": {"briefSummary": "We test a drug."},
          "designModule": {
            "studyType": "INTERVENTIONAL",
            "phases": ["PHASE2", "PHASE3"]
          },
          "contactsLocationsModule": {
            "overallOfficials": [{"name": "Jane Doe, MD"}]
          },
          "conditionsModule": {"conditions": ["Heart Failure"]}
        }
      }]
    }"#;

    fn default_opts() -> SearchOptions {
        SearchOptions {
            per_page: 20,
            page: 0,
            year_start: None,
            year_end: None,
            open_access_only: false,
        }
    }

    #[tokio::test]
    async fn test_search_maps_study() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/studies.*".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(STUDY_JSON)
            .create_async()
            .await;

        let source = ClinicalTrialsSource::new(
            HttpClient::new(),
            Arc::new(CircuitBreaker::default_for(SourceId::ClinicalTrials)),
        )
        .with_base_url(server.url());

        let results = source
            .search("heart failure drug", &default_opts())
            .await
            .expect("search should succeed");
        assert_eq!(results.total, 3);
        assert_eq!(results.records.len(), 1);

        let record = &results.records[0];
        assert_eq!(record.title, "A Randomized Trial of Something Important");
        assert_eq!(record.nct_id.as_deref(), Some("NCT04157751"));
        assert_eq!(record.journal, "Mayo Clinic");
        assert_eq!(record.year, 2022);
        assert_eq!(record.authors, vec!["Jane Doe, MD".to_string()]);
        assert_eq!(
            record.abstract_text.as_deref(),
            Some("We test a drug. | Phase: PHASE2, PHASE3 | Status: RECRUITING")
        );
        assert_eq!(record.mesh_terms, vec!["Heart Failure".to_string()]);
        assert_eq!(record.study_type, StudyType::Rct);
        assert_eq!(record.evidence_level, EvidenceLevel::II);
        assert_eq!(record.trial_status.as_deref(), Some("RECRUITING"));
        assert_eq!(record.trial_phase.as_deref(), Some("PHASE2, PHASE3"));
        assert_eq!(record.citation_count, 0);
        assert!(record.is_open_access);
    }

    #[test]
    fn test_build_url_carries_status_filter() {
        let source = ClinicalTrialsSource::new(
            HttpClient::new(),
            Arc::new(CircuitBreaker::default_for(SourceId::ClinicalTrials)),
        );
        let url = source.build_url("asthma", &default_opts());
        assert!(!url.contains("filter.overallStatus"));

        let filtered = source
            .with_status_filter(vec!["RECRUITING".to_string(), "COMPLETED".to_string()]);
        let url = filtered.build_url("asthma", &default_opts());
        assert!(url.contains("query.term=asthma"));
        assert!(url.contains("&filter.overallStatus=RECRUITING,COMPLETED"));
    }

    #[test]
    fn test_map_design() {
        let interventional = DesignModule {
            study_type: Some("Interventional".to_string()),
            phases: vec![],
        };
        assert_eq!(map_design(Some(&interventional)), StudyType::Rct);

        let observational = DesignModule {
            study_type: Some("OBSERVATIONAL".to_string()),
            phases: vec![],
        };
        assert_eq!(map_design(Some(&observational)), StudyType::Observational);

        let expanded = DesignModule {
            study_type: Some("Expanded Access".to_string()),
            phases: vec![],
        };
        assert_eq!(map_design(Some(&expanded)), StudyType::Other);
        assert_eq!(map_design(None), StudyType::Other);
    }

    #[test]
    fn test_parse_start_year() {
        let status = StatusModule {
            overall_status: None,
            start_date_struct: Some(DateStruct {
                date: Some("2019-11".to_string()),
            }),
        };
        assert_eq!(parse_start_year(Some(&status)), 2019);
        assert_eq!(parse_start_year(None), 0);
    }
}
