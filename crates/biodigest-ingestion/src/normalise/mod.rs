//! Source record → `Paper` normalisation.
//!
//! Each `RawRecord` variant is mapped into the shared `Paper` shape with
//! explicit empty defaults. A record that cannot produce both a canonical id
//! and a title is dropped with a logged reason; one bad record never aborts
//! the batch.

pub mod text;

use chrono::{NaiveDate, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info};

use biodigest_common::Paper;

use crate::identity::{arxiv_version, resolve_canonical_id, strip_arxiv_version, IdentityCandidates};
use crate::links::extract_links;
use crate::models::{ArxivRecord, BioRxivRecord, PubMedRecord, RawRecord};
use text::collapse_whitespace;

/// PubMed contributes at most this many MeSH descriptors as categories.
const MAX_MESH_CATEGORIES: usize = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormaliseError {
    #[error("no usable identifier")]
    MissingIdentity,

    #[error("missing title for {0}")]
    MissingTitle(String),
}

/// Outcome of normalising one batch.
#[derive(Debug, Default)]
pub struct NormaliseReport {
    pub papers: Vec<Paper>,
    pub dropped: usize,
}

/// Normalise a whole batch, preserving arrival order and logging every drop.
pub fn normalise_batch(records: Vec<RawRecord>) -> NormaliseReport {
    let mut report = NormaliseReport::default();
    for record in records {
        let described = record.describe();
        match normalise_record(record) {
            Ok(paper) => report.papers.push(paper),
            Err(e) => {
                debug!(record = %described, reason = %e, "Dropping record");
                report.dropped += 1;
            }
        }
    }
    info!(papers = report.papers.len(), dropped = report.dropped, "Normalisation complete");
    report
}

/// Map one raw record into a `Paper`.
pub fn normalise_record(record: RawRecord) -> Result<Paper, NormaliseError> {
    let canonical_id = resolve_canonical_id(&IdentityCandidates::from_record(&record))
        .ok_or(NormaliseError::MissingIdentity)?;

    let source = record.source();
    let title = match &record {
        RawRecord::Arxiv(r)   => r.title.as_deref(),
        RawRecord::PubMed(r)  => r.title.as_deref(),
        RawRecord::BioRxiv(r) => r.title.as_deref(),
    }
    .map(collapse_whitespace)
    .filter(|t| !t.is_empty())
    .ok_or_else(|| NormaliseError::MissingTitle(canonical_id.clone()))?;

    let mut paper = Paper::new(canonical_id, source, title);
    match record {
        RawRecord::Arxiv(r)   => fill_arxiv(&mut paper, r),
        RawRecord::PubMed(r)  => fill_pubmed(&mut paper, r),
        RawRecord::BioRxiv(r) => fill_biorxiv(&mut paper, r),
    }

    let found = extract_links(&format!("{} {}", paper.abstract_text, paper.comments));
    paper.links.code.extend(found.code);
    paper.links.datasets.extend(found.datasets);
    Ok(paper)
}

fn fill_arxiv(paper: &mut Paper, r: ArxivRecord) {
    let id = r.id.as_deref().map(str::trim).unwrap_or_default().to_string();
    paper.version = arxiv_version(&id);
    paper.abstract_text = r.summary.as_deref().map(collapse_whitespace).unwrap_or_default();
    paper.authors = clean_names(r.authors);
    paper.categories = r.categories.into_iter().filter(|c| !c.trim().is_empty()).collect();
    paper.comments = r.comment.as_deref().map(collapse_whitespace).unwrap_or_default();
    paper.published_at = r.published;
    paper.updated_at = r.updated;

    let base = strip_arxiv_version(&id);
    paper.links.page = r.abs_url
        .or_else(|| (!base.is_empty()).then(|| format!("https://arxiv.org/abs/{base}")));
    paper.links.pdf = r.pdf_url
        .or_else(|| (!base.is_empty()).then(|| format!("https://arxiv.org/pdf/{base}.pdf")));
}

fn fill_pubmed(paper: &mut Paper, r: PubMedRecord) {
    paper.version = 1;
    paper.abstract_text = r.abstract_sections
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| match s.label.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            Some(label) => format!("{label}: {}", collapse_whitespace(&s.text)),
            None => collapse_whitespace(&s.text),
        })
        .collect::<Vec<_>>()
        .join(" ");
    paper.authors = clean_names(r.authors);
    paper.categories = r.mesh_terms
        .into_iter()
        .filter(|m| !m.trim().is_empty())
        .take(MAX_MESH_CATEGORIES)
        .collect();
    paper.published_at = r.published.and_then(midnight_utc);
    paper.links.page = r.pmid
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("https://pubmed.ncbi.nlm.nih.gov/{p}/"));
}

fn fill_biorxiv(paper: &mut Paper, r: BioRxivRecord) {
    paper.version = r.version
        .as_deref()
        .map(|v| v.trim().trim_start_matches(['v', 'V']))
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(1);
    paper.abstract_text = r.abstract_text.as_deref().map(collapse_whitespace).unwrap_or_default();
    paper.authors = r.authors
        .as_deref()
        .map(|a| a.split(';').map(str::to_string).collect())
        .map(clean_names)
        .unwrap_or_default();
    paper.categories = r.category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .into_iter()
        .collect();
    paper.published_at = r.date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        .and_then(midnight_utc);

    if let Some(doi) = r.doi.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        let page = format!("https://www.{}.org/content/{doi}", r.server.as_str());
        paper.links.pdf = Some(format!("{page}.full.pdf"));
        paper.links.page = Some(page);
    }
}

fn clean_names(names: Vec<String>) -> Vec<String> {
    names
        .iter()
        .map(|n| collapse_whitespace(n))
        .filter(|n| !n.is_empty())
        .collect()
}

fn midnight_utc(date: NaiveDate) -> Option<chrono::DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt))
}
