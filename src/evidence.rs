//! Evidence-level classification for study designs.
//!
//! Maps canonical study types onto the five-tier evidence hierarchy used in
//! evidence-based medicine, from systematic reviews and meta-analyses (I)
//! down to expert opinion and unclassified material (V). Each upstream source
//! has its own raw publication-type vocabulary; the `map_*` functions below
//! translate those raw tags into the canonical [`StudyType`].

use serde::{Deserialize, Serialize};

/// Canonical study design, shared across all sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyType {
    MetaAnalysis,
    SystematicReview,
    Rct,
    Cohort,
    Observational,
    CaseControl,
    CaseReport,
    Review,
    Other,
}

impl StudyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyType::MetaAnalysis => "meta_analysis",
            StudyType::SystematicReview => "systematic_review",
            StudyType::Rct => "rct",
            StudyType::Cohort => "cohort",
            StudyType::Observational => "observational",
            StudyType::CaseControl => "case_control",
            StudyType::CaseReport => "case_report",
            StudyType::Review => "review",
            StudyType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "meta_analysis" => Some(StudyType::MetaAnalysis),
            "systematic_review" => Some(StudyType::SystematicReview),
            "rct" => Some(StudyType::Rct),
            "cohort" => Some(StudyType::Cohort),
            "observational" => Some(StudyType::Observational),
            "case_control" => Some(StudyType::CaseControl),
            "case_report" => Some(StudyType::CaseReport),
            "review" => Some(StudyType::Review),
            "other" => Some(StudyType::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for StudyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evidence level I (strongest) through V (weakest/unclassified).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvidenceLevel {
    I,
    II,
    III,
    IV,
    V,
}

impl EvidenceLevel {
    /// Derive the evidence level from a canonical study type.
    ///
    /// This is a pure, total mapping: unknown or unclassified designs fall
    /// through to level V.
    pub fn from_study_type(study_type: StudyType) -> Self {
        match study_type {
            StudyType::MetaAnalysis | StudyType::SystematicReview => EvidenceLevel::I,
            StudyType::Rct => EvidenceLevel::II,
            StudyType::Cohort | StudyType::Observational => EvidenceLevel::III,
            StudyType::CaseControl | StudyType::CaseReport => EvidenceLevel::IV,
            StudyType::Review | StudyType::Other => EvidenceLevel::V,
        }
    }

    /// Human-readable label for the level.
    pub fn label(&self) -> &'static str {
        match self {
            EvidenceLevel::I => "Systematic Review / Meta-Analysis",
            EvidenceLevel::II => "Randomized Controlled Trial",
            EvidenceLevel::III => "Cohort / Observational Study",
            EvidenceLevel::IV => "Case Report / Case Series",
            EvidenceLevel::V => "Expert Opinion / Other",
        }
    }

    /// Ordinal position (I = 1) used for evidence-level sorting.
    pub fn ordinal(&self) -> u8 {
        match self {
            EvidenceLevel::I => 1,
            EvidenceLevel::II => 2,
            EvidenceLevel::III => 3,
            EvidenceLevel::IV => 4,
            EvidenceLevel::V => 5,
        }
    }
}

impl std::fmt::Display for EvidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvidenceLevel::I => "I",
            EvidenceLevel::II => "II",
            EvidenceLevel::III => "III",
            EvidenceLevel::IV => "IV",
            EvidenceLevel::V => "V",
        };
        write!(f, "{}", s)
    }
}

/// Map a raw PubMed `<PublicationType>` value to a canonical study type.
///
/// PubMed tags are free-form MEDLINE vocabulary, so matching is substring
/// based. Order matters: "meta-analysis" must win over the generic "review".
pub fn map_pubmed_publication_type(pub_type: &str) -> StudyType {
    let normalized = pub_type.to_lowercase();
    let normalized = normalized.trim();
    if normalized.contains("meta-analysis") {
        StudyType::MetaAnalysis
    } else if normalized.contains("systematic review") {
        StudyType::SystematicReview
    } else if normalized.contains("randomized controlled trial") {
        StudyType::Rct
    } else if normalized.contains("clinical trial") {
        StudyType::Rct
    } else if normalized.contains("observational study") {
        StudyType::Observational
    } else if normalized.contains("cohort") {
        StudyType::Cohort
    } else if normalized.contains("case-control") {
        StudyType::CaseControl
    } else if normalized.contains("case report") {
        StudyType::CaseReport
    } else if normalized.contains("review") {
        StudyType::Review
    } else {
        StudyType::Other
    }
}

/// Map a Semantic Scholar `publicationTypes` entry to a canonical study type.
pub fn map_s2_publication_type(pub_type: &str) -> StudyType {
    let normalized = pub_type.to_lowercase();
    match normalized.trim() {
        "review" => StudyType::Review,
        "casereport" | "case report" => StudyType::CaseReport,
        "clinicaltrial" | "clinical trial" => StudyType::Rct,
        "metaanalysis" | "meta-analysis" => StudyType::MetaAnalysis,
        // journal articles, editorials, letters carry no design signal
        _ => StudyType::Other,
    }
}

/// Map an OpenAlex work `type` to a canonical study type.
///
/// OpenAlex types describe the document genre rather than the study design,
/// so only "review" carries any classification signal.
pub fn map_openalex_type(work_type: &str) -> StudyType {
    match work_type.to_lowercase().trim() {
        "review" => StudyType::Review,
        _ => StudyType::Other,
    }
}

/// Derive a record's canonical study type from its raw tags.
///
/// Tags are consumed in the order the source returned them; the first tag
/// that maps to a non-Other type wins. Records with no classifiable tag are
/// Other (evidence level V).
pub fn derive_study_type<F>(raw_tags: &[String], mapper: F) -> StudyType
where
    F: Fn(&str) -> StudyType,
{
    for tag in raw_tags {
        let mapped = mapper(tag);
        if mapped != StudyType::Other {
            return mapped;
        }
    }
    StudyType::Other
}
