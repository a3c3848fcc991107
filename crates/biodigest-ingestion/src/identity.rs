//! Canonical identity resolution.
//!
//! One pure function picks the deduplication key for a record from a fixed
//! priority list:
//!
//!   1. DOI (cross-source persistent id)       → `doi:<lowercased doi>`
//!   2. source-native id (arXiv id, PMID)      → `arxiv:<id sans version>` / `pmid:<pmid>`
//!   3. normalised title                       → `title:<title key>`
//!
//! The first non-empty candidate wins. The order never changes between runs,
//! so re-fetching a paper always yields the same key and the history ledger
//! keeps working.

use crate::models::RawRecord;
use crate::normalise::text::title_key;

/// The identifier fields a record happens to carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityCandidates {
    pub doi: Option<String>,
    /// Already namespaced, e.g. `arxiv:2501.00001`.
    pub native_id: Option<String>,
    pub title: Option<String>,
}

impl IdentityCandidates {
    pub fn from_record(record: &RawRecord) -> Self {
        match record {
            RawRecord::Arxiv(r) => Self {
                doi: r.doi.clone(),
                native_id: r.id.as_deref()
                    .map(strip_arxiv_version)
                    .filter(|id| !id.is_empty())
                    .map(|id| format!("arxiv:{id}")),
                title: r.title.clone(),
            },
            RawRecord::PubMed(r) => Self {
                doi: r.doi.clone(),
                native_id: r.pmid.as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(|id| format!("pmid:{id}")),
                title: r.title.clone(),
            },
            // Preprint servers identify papers by DOI only.
            RawRecord::BioRxiv(r) => Self {
                doi: r.doi.clone(),
                native_id: None,
                title: r.title.clone(),
            },
        }
    }
}

/// Resolve the canonical id, or `None` if no candidate is usable.
pub fn resolve_canonical_id(candidates: &IdentityCandidates) -> Option<String> {
    if let Some(doi) = candidates.doi.as_deref().map(normalise_doi).filter(|d| !d.is_empty()) {
        return Some(format!("doi:{doi}"));
    }
    if let Some(native) = candidates.native_id.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return Some(native.to_string());
    }
    candidates.title
        .as_deref()
        .map(title_key)
        .filter(|t| !t.is_empty())
        .map(|t| format!("title:{t}"))
}

/// Lowercase, trim, and strip resolver prefixes (`https://doi.org/`, `doi:`).
pub fn normalise_doi(doi: &str) -> String {
    let lower = doi.trim().to_lowercase();
    let stripped = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower);
    stripped.trim().to_string()
}

/// `2501.01234v3` → `2501.01234`; ids without a version suffix pass through.
pub fn strip_arxiv_version(id: &str) -> &str {
    let id = id.trim();
    match id.rfind('v') {
        Some(pos) if pos + 1 < id.len() && id[pos + 1..].chars().all(|c| c.is_ascii_digit()) => &id[..pos],
        _ => id,
    }
}

/// Version from an arXiv id suffix, defaulting to 1.
pub fn arxiv_version(id: &str) -> u32 {
    let id = id.trim();
    let base = strip_arxiv_version(id);
    if base.len() == id.len() {
        return 1;
    }
    id[base.len() + 1..].parse::<u32>().ok().filter(|v| *v > 0).unwrap_or(1)
}
