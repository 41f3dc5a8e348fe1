//! Reciprocal Rank Fusion with cross-source identity resolution.
//!
//! Each source returns a relevance-ordered list; a record at 1-based rank `r`
//! contributes `1 / (k + r)` to its fused score, and a paper found by several
//! sources accumulates one contribution per appearance. Identity matching
//! falls through DOI, PMID, Semantic Scholar ID, then normalized title plus
//! year. Source lists are processed in precedence order, so the
//! highest-precedence source's metadata wins any field conflict.

use std::collections::HashSet;

use crate::evidence::{EvidenceLevel, StudyType};
use crate::models::{SourceId, UnifiedRecord};

/// Standard RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Titles are clipped to this length before comparison; beyond it they stop
/// discriminating and only accumulate noise.
const NORMALIZED_TITLE_MAX: usize = 150;

/// Rank-fusion engine.
#[derive(Debug, Clone)]
pub struct RankFusion {
    k: f64,
    precedence: Vec<SourceId>,
}

impl RankFusion {
    pub fn new(k: f64, precedence: Vec<SourceId>) -> Self {
        Self { k, precedence }
    }

    /// Fuse per-source result lists into one ranked, deduplicated list.
    ///
    /// Output is ordered by RRF score descending; ties break on source count,
    /// then citation count, then first-seen order.
    pub fn fuse(&self, mut lists: Vec<(SourceId, Vec<UnifiedRecord>)>) -> Vec<UnifiedRecord> {
        lists.sort_by_key(|(source, _)| self.precedence_rank(*source));

        let mut merged: Vec<UnifiedRecord> = Vec::new();
        let mut scores: Vec<f64> = Vec::new();

        for (source, records) in lists {
            for (rank, mut record) in records.into_iter().enumerate() {
                let contribution = 1.0 / (self.k + (rank + 1) as f64);
                if !record.sources.contains(&source) {
                    record.sources.push(source);
                }

                match merged.iter().position(|m| is_same_record(m, &record)) {
                    Some(idx) => {
                        scores[idx] += contribution;
                        merge_metadata(&mut merged[idx], record);
                    }
                    None => {
                        merged.push(record);
                        scores.push(contribution);
                    }
                }
            }
        }

        let mut indexed: Vec<(usize, UnifiedRecord, f64)> = merged
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(first_seen, (record, score))| (first_seen, record, score))
            .collect();

        indexed.sort_by(|(a_seen, a, a_score), (b_seen, b, b_score)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| b.sources.len().cmp(&a.sources.len()))
                .then_with(|| b.citation_count.cmp(&a.citation_count))
                .then_with(|| a_seen.cmp(b_seen))
        });

        indexed
            .into_iter()
            .map(|(_, mut record, score)| {
                record.rrf_score = Some(score);
                record
            })
            .collect()
    }

    fn precedence_rank(&self, source: SourceId) -> usize {
        self.precedence
            .iter()
            .position(|&s| s == source)
            .unwrap_or(self.precedence.len())
    }
}

impl Default for RankFusion {
    fn default() -> Self {
        Self::new(
            DEFAULT_RRF_K,
            vec![
                SourceId::Pubmed,
                SourceId::Openalex,
                SourceId::SemanticScholar,
                SourceId::ClinicalTrials,
            ],
        )
    }
}

/// Lowercase, strip everything but alphanumerics and spaces, collapse
/// whitespace, clip.
pub fn normalize_title(title: &str) -> String {
    let mut normalized = String::with_capacity(title.len());
    let mut pending_space = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_space && !normalized.is_empty() {
                normalized.push(' ');
            }
            pending_space = false;
            normalized.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() {
            pending_space = true;
        }
    }
    normalized.chars().take(NORMALIZED_TITLE_MAX).collect()
}

/// Identity check: DOI (case-insensitive), PMID, S2 ID, then normalized
/// title + year.
pub fn is_same_record(a: &UnifiedRecord, b: &UnifiedRecord) -> bool {
    if let (Some(a_doi), Some(b_doi)) = (&a.doi, &b.doi) {
        if a_doi.eq_ignore_ascii_case(b_doi) {
            return true;
        }
    }
    if let (Some(a_pmid), Some(b_pmid)) = (&a.pmid, &b.pmid) {
        if a_pmid == b_pmid {
            return true;
        }
    }
    if let (Some(a_s2), Some(b_s2)) = (&a.s2_id, &b.s2_id) {
        if a_s2 == b_s2 {
            return true;
        }
    }
    a.year != 0
        && a.year == b.year
        && !a.title.is_empty()
        && !b.title.is_empty()
        && normalize_title(&a.title) == normalize_title(&b.title)
}

fn union(primary: Vec<String>, secondary: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = primary.iter().cloned().collect();
    let mut out = primary;
    for item in secondary {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

/// Merge a lower-precedence record into a higher-precedence one, in place.
///
/// Scalars keep the primary's value unless it is missing; citation counts
/// take the maximum; tag lists union; source lists union.
pub fn merge_metadata(primary: &mut UnifiedRecord, secondary: UnifiedRecord) {
    primary.doi = primary.doi.take().or(secondary.doi);
    primary.pmid = primary.pmid.take().or(secondary.pmid);
    primary.s2_id = primary.s2_id.take().or(secondary.s2_id);
    primary.openalex_id = primary.openalex_id.take().or(secondary.openalex_id);
    primary.nct_id = primary.nct_id.take().or(secondary.nct_id);

    primary.abstract_text = primary.abstract_text.take().or(secondary.abstract_text);
    primary.tldr = primary.tldr.take().or(secondary.tldr);
    primary.open_access_pdf_url = primary
        .open_access_pdf_url
        .take()
        .or(secondary.open_access_pdf_url);
    primary.is_open_access = primary.is_open_access || secondary.is_open_access;
    primary.trial_status = primary.trial_status.take().or(secondary.trial_status);
    primary.trial_phase = primary.trial_phase.take().or(secondary.trial_phase);

    primary.citation_count = primary.citation_count.max(secondary.citation_count);
    primary.influential_citation_count = primary
        .influential_citation_count
        .max(secondary.influential_citation_count);
    primary.reference_count = primary.reference_count.max(secondary.reference_count);

    if primary.authors.is_empty() {
        primary.authors = secondary.authors;
    }
    if primary.journal.is_empty() {
        primary.journal = secondary.journal;
    }
    if primary.year == 0 {
        primary.year = secondary.year;
    }
    if primary.mesh_terms.is_empty() {
        primary.mesh_terms = secondary.mesh_terms;
    }

    primary.publication_types = union(
        std::mem::take(&mut primary.publication_types),
        secondary.publication_types,
    );
    primary.fields_of_study = union(
        std::mem::take(&mut primary.fields_of_study),
        secondary.fields_of_study,
    );
    primary.concepts = union(std::mem::take(&mut primary.concepts), secondary.concepts);

    if primary.study_type == StudyType::Other && secondary.study_type != StudyType::Other {
        primary.study_type = secondary.study_type;
        primary.evidence_level = EvidenceLevel::from_study_type(secondary.study_type);
    }

    for source in secondary.sources {
        if !primary.sources.contains(&source) {
            primary.sources.push(source);
        }
    }
}
