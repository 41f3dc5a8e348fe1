//! Unified record model representing a paper or trial from any source.

use serde::{Deserialize, Serialize};

use crate::evidence::{EvidenceLevel, StudyType};

/// The upstream service a record (or part of a merged record) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Pubmed,
    SemanticScholar,
    Openalex,
    ClinicalTrials,
}

impl SourceId {
    /// Display name of the source.
    pub fn name(&self) -> &'static str {
        match self {
            SourceId::Pubmed => "PubMed",
            SourceId::SemanticScholar => "Semantic Scholar",
            SourceId::Openalex => "OpenAlex",
            SourceId::ClinicalTrials => "ClinicalTrials.gov",
        }
    }

    /// Stable identifier used in request filters and response maps.
    pub fn id(&self) -> &'static str {
        match self {
            SourceId::Pubmed => "pubmed",
            SourceId::SemanticScholar => "semantic_scholar",
            SourceId::Openalex => "openalex",
            SourceId::ClinicalTrials => "clinical_trials",
        }
    }

    /// Parse a source identifier as it appears in requests.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pubmed" => Some(SourceId::Pubmed),
            "semantic_scholar" | "semantic" => Some(SourceId::SemanticScholar),
            "openalex" => Some(SourceId::Openalex),
            "clinical_trials" | "clinicaltrials" => Some(SourceId::ClinicalTrials),
            _ => None,
        }
    }

    /// All sources, in the default fan-out order.
    pub fn all() -> [SourceId; 4] {
        [
            SourceId::Pubmed,
            SourceId::SemanticScholar,
            SourceId::Openalex,
            SourceId::ClinicalTrials,
        ]
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// One literature or trial record in the shape shared by every adapter.
///
/// At least one identity field (`doi`, `pmid`, `s2_id`, `openalex_id`,
/// `nct_id`) is expected to be present; records without any are still
/// resolvable for dedup via normalized title + year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedRecord {
    // Identity
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub s2_id: Option<String>,
    pub openalex_id: Option<String>,
    pub nct_id: Option<String>,

    // Descriptive
    pub title: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub year: i32,
    pub abstract_text: Option<String>,
    /// Machine-generated one-sentence summary (Semantic Scholar TLDR).
    pub tldr: Option<String>,

    // Metrics
    pub citation_count: u32,
    pub influential_citation_count: Option<u32>,
    pub reference_count: Option<u32>,

    // Classification
    pub study_type: StudyType,
    pub evidence_level: EvidenceLevel,
    /// Raw source-specific publication type tags, in source order.
    pub publication_types: Vec<String>,
    pub mesh_terms: Vec<String>,
    pub fields_of_study: Vec<String>,
    pub concepts: Vec<String>,

    // Access
    pub is_open_access: bool,
    pub open_access_pdf_url: Option<String>,

    // Trial registration details (ClinicalTrials.gov only)
    pub trial_status: Option<String>,
    pub trial_phase: Option<String>,

    // Provenance
    pub sources: Vec<SourceId>,
    pub rrf_score: Option<f64>,
    pub rerank_score: Option<f32>,
}

impl UnifiedRecord {
    /// Create an empty record attributed to a single source.
    pub fn new(title: impl Into<String>, source: SourceId) -> Self {
        Self {
            doi: None,
            pmid: None,
            s2_id: None,
            openalex_id: None,
            nct_id: None,
            title: title.into(),
            authors: Vec::new(),
            journal: String::new(),
            year: 0,
            abstract_text: None,
            tldr: None,
            citation_count: 0,
            influential_citation_count: None,
            reference_count: None,
            study_type: StudyType::Other,
            evidence_level: EvidenceLevel::V,
            publication_types: Vec::new(),
            mesh_terms: Vec::new(),
            fields_of_study: Vec::new(),
            concepts: Vec::new(),
            is_open_access: false,
            open_access_pdf_url: None,
            trial_status: None,
            trial_phase: None,
            sources: vec![source],
            rrf_score: None,
            rerank_score: None,
        }
    }

    /// Whether the record carries any hard identifier.
    pub fn has_identity(&self) -> bool {
        self.doi.is_some()
            || self.pmid.is_some()
            || self.s2_id.is_some()
            || self.openalex_id.is_some()
            || self.nct_id.is_some()
    }

    /// Text used as the document body for reranking: title plus whichever of
    /// abstract or TLDR is available.
    pub fn rerank_document(&self) -> String {
        let body = self
            .abstract_text
            .as_deref()
            .or(self.tldr.as_deref())
            .unwrap_or("");
        format!("{}. {}", self.title, body)
    }
}

/// Builder for constructing [`UnifiedRecord`]s inside adapters.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: UnifiedRecord,
}

impl RecordBuilder {
    pub fn new(title: impl Into<String>, source: SourceId) -> Self {
        Self {
            record: UnifiedRecord::new(title, source),
        }
    }

    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        let doi = doi.into();
        if !doi.is_empty() {
            self.record.doi = Some(doi);
        }
        self
    }

    pub fn pmid(mut self, pmid: impl Into<String>) -> Self {
        let pmid = pmid.into();
        if !pmid.is_empty() {
            self.record.pmid = Some(pmid);
        }
        self
    }

    pub fn s2_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.is_empty() {
            self.record.s2_id = Some(id);
        }
        self
    }

    pub fn openalex_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.is_empty() {
            self.record.openalex_id = Some(id);
        }
        self
    }

    pub fn nct_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.is_empty() {
            self.record.nct_id = Some(id);
        }
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.record.authors = authors;
        self
    }

    pub fn journal(mut self, journal: impl Into<String>) -> Self {
        self.record.journal = journal.into();
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.record.year = year;
        self
    }

    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.record.abstract_text = Some(text);
        }
        self
    }

    pub fn tldr(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.record.tldr = Some(text);
        }
        self
    }

    pub fn citation_count(mut self, count: u32) -> Self {
        self.record.citation_count = count;
        self
    }

    pub fn influential_citation_count(mut self, count: u32) -> Self {
        self.record.influential_citation_count = Some(count);
        self
    }

    pub fn reference_count(mut self, count: u32) -> Self {
        self.record.reference_count = Some(count);
        self
    }

    /// Set the canonical study type and derive the matching evidence level.
    pub fn study_type(mut self, study_type: StudyType) -> Self {
        self.record.study_type = study_type;
        self.record.evidence_level = EvidenceLevel::from_study_type(study_type);
        self
    }

    pub fn publication_types(mut self, types: Vec<String>) -> Self {
        self.record.publication_types = types;
        self
    }

    pub fn mesh_terms(mut self, terms: Vec<String>) -> Self {
        self.record.mesh_terms = terms;
        self
    }

    pub fn fields_of_study(mut self, fields: Vec<String>) -> Self {
        self.record.fields_of_study = fields;
        self
    }

    pub fn concepts(mut self, concepts: Vec<String>) -> Self {
        self.record.concepts = concepts;
        self
    }

    pub fn open_access(mut self, is_oa: bool) -> Self {
        self.record.is_open_access = is_oa;
        self
    }

    pub fn open_access_pdf_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.is_empty() {
            self.record.open_access_pdf_url = Some(url);
        }
        self
    }

    pub fn trial_status(mut self, status: impl Into<String>) -> Self {
        let status = status.into();
        if !status.is_empty() {
            self.record.trial_status = Some(status);
        }
        self
    }

    pub fn trial_phase(mut self, phase: impl Into<String>) -> Self {
        let phase = phase.into();
        if !phase.is_empty() {
            self.record.trial_phase = Some(phase);
        }
        self
    }

    pub fn build(self) -> UnifiedRecord {
        self.record
    }
}
