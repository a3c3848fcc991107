//! Canonical paper model flowing through the digest pipeline.
//!
//! A `Paper` is built once by the normaliser and then threaded through each
//! stage by value: every stage consumes the paper and returns a newly
//! annotated one (`with_heuristic`, `with_verdict`, ...). Nothing mutates a
//! paper after the tiered selector has placed it.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which origin produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Arxiv,
    PubMed,
    BioRxiv,
    MedRxiv,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Arxiv   => "arxiv",
            SourceKind::PubMed  => "pubmed",
            SourceKind::BioRxiv => "biorxiv",
            SourceKind::MedRxiv => "medrxiv",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound links. Code and dataset links are sets: deduplicated and
/// order-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperLinks {
    pub page: Option<String>,
    pub pdf: Option<String>,
    #[serde(default)]
    pub code: BTreeSet<String>,
    #[serde(default)]
    pub datasets: BTreeSet<String>,
}

/// Output of the heuristic policy engine for a paper that survived it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeuristicAnnotation {
    /// 0–100, capped.
    pub score: f64,
    /// Bucket names in configured order. Advisory only; the selector uses
    /// the classifier's buckets.
    pub detected_buckets: Vec<String>,
    pub greylisted: bool,
}

/// The external classifier's opinion of a paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub keep: bool,
    /// 0–100, clamped on construction by the classifier client.
    pub relevance_score: f64,
    #[serde(default)]
    pub buckets: BTreeSet<String>,
    #[serde(default)]
    pub risk_flags: BTreeSet<String>,
    #[serde(default)]
    pub why_it_matters: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub code_urls: BTreeSet<String>,
    #[serde(default)]
    pub dataset_urls: BTreeSet<String>,
    /// Set when this verdict is a fallback produced after a failed call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Optional references from the figure and social-post collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub figure_url: Option<String>,
    pub social_url: Option<String>,
}

/// Terminal placement of a processed paper. Exactly one per paper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "tier", content = "bucket")]
pub enum Placement {
    TopPick,
    Bucket(String),
    Noteworthy,
    #[default]
    Excluded,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::TopPick      => f.write_str("top_pick"),
            Placement::Bucket(name) => write!(f, "bucket:{name}"),
            Placement::Noteworthy   => f.write_str("noteworthy"),
            Placement::Excluded     => f.write_str("excluded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    // ── Identity ─────────────────────────────────────────────────────────────
    pub canonical_id: String,
    pub source: SourceKind,
    /// Positive, non-decreasing per `canonical_id` over time.
    pub version: u32,

    // ── Content ──────────────────────────────────────────────────────────────
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub categories: BTreeSet<String>,
    /// Free-text author comments (arXiv); empty for other sources.
    pub comments: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub links: PaperLinks,

    // ── Annotations ──────────────────────────────────────────────────────────
    pub heuristic: HeuristicAnnotation,
    pub verdict: Option<ClassifierVerdict>,
    pub enrichment: Enrichment,

    // ── Derived ──────────────────────────────────────────────────────────────
    pub final_score: f64,
    pub in_top_picks: bool,
    pub placement: Placement,
}

impl Paper {
    /// A bare paper with empty defaults for everything except identity and title.
    pub fn new(canonical_id: impl Into<String>, source: SourceKind, title: impl Into<String>) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            source,
            version: 1,
            title: title.into(),
            abstract_text: String::new(),
            authors: Vec::new(),
            categories: BTreeSet::new(),
            comments: String::new(),
            published_at: None,
            updated_at: None,
            links: PaperLinks::default(),
            heuristic: HeuristicAnnotation::default(),
            verdict: None,
            enrichment: Enrichment::default(),
            final_score: 0.0,
            in_top_picks: false,
            placement: Placement::Excluded,
        }
    }

    /// Title and abstract joined by a space; the text every rule is evaluated over.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
    }

    pub fn with_heuristic(mut self, heuristic: HeuristicAnnotation) -> Self {
        self.heuristic = heuristic;
        self
    }

    /// Attach a classifier verdict, unioning its code/dataset URLs into the
    /// paper's link sets.
    pub fn with_verdict(mut self, verdict: ClassifierVerdict) -> Self {
        self.links.code.extend(verdict.code_urls.iter().cloned());
        self.links.datasets.extend(verdict.dataset_urls.iter().cloned());
        self.verdict = Some(verdict);
        self
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_final_score(mut self, score: f64) -> Self {
        self.final_score = score;
        self
    }

    pub fn placed(mut self, placement: Placement) -> Self {
        self.in_top_picks = placement == Placement::TopPick;
        self.placement = placement;
        self
    }

    pub fn relevance_score(&self) -> f64 {
        self.verdict.as_ref().map(|v| v.relevance_score).unwrap_or(0.0)
    }

    pub fn classifier_keep(&self) -> bool {
        self.verdict.as_ref().map(|v| v.keep).unwrap_or(false)
    }

    /// Classifier-reported bucket membership.
    pub fn has_bucket(&self, name: &str) -> bool {
        self.verdict.as_ref().map(|v| v.buckets.contains(name)).unwrap_or(false)
    }

    pub fn has_risk_flag(&self, flag: &str) -> bool {
        self.verdict.as_ref().map(|v| v.risk_flags.contains(flag)).unwrap_or(false)
    }

    /// Most recent timestamp the source reported, if any.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.published_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_tags() {
        assert_eq!(Placement::TopPick.to_string(), "top_pick");
        assert_eq!(Placement::Bucket("Drug Discovery".into()).to_string(), "bucket:Drug Discovery");
        assert_eq!(Placement::Noteworthy.to_string(), "noteworthy");
        assert_eq!(Placement::Excluded.to_string(), "excluded");
    }

    #[test]
    fn test_with_verdict_unions_links() {
        let mut paper = Paper::new("doi:10.1/x", SourceKind::BioRxiv, "T");
        paper.links.code.insert("https://github.com/a/b".into());

        let verdict = ClassifierVerdict {
            keep: true,
            relevance_score: 70.0,
            code_urls: ["https://github.com/a/b".to_string(), "https://gitlab.com/c/d".to_string()].into(),
            dataset_urls: ["https://zenodo.org/record/1".to_string()].into(),
            ..Default::default()
        };
        let paper = paper.with_verdict(verdict);

        assert_eq!(paper.links.code.len(), 2);
        assert_eq!(paper.links.datasets.len(), 1);
        assert!(paper.classifier_keep());
        assert_eq!(paper.relevance_score(), 70.0);
    }

    #[test]
    fn test_placed_sets_top_pick_flag() {
        let paper = Paper::new("pmid:1", SourceKind::PubMed, "T").placed(Placement::TopPick);
        assert!(paper.in_top_picks);
        let paper = paper.placed(Placement::Noteworthy);
        assert!(!paper.in_top_picks);
    }

    #[test]
    fn test_latest_timestamp_prefers_updated() {
        let mut paper = Paper::new("pmid:1", SourceKind::PubMed, "T");
        assert!(paper.latest_timestamp().is_none());
        let published = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let updated = DateTime::parse_from_rfc3339("2025-02-01T00:00:00Z").unwrap().with_timezone(&Utc);
        paper.published_at = Some(published);
        assert_eq!(paper.latest_timestamp(), Some(published));
        paper.updated_at = Some(updated);
        assert_eq!(paper.latest_timestamp(), Some(updated));
    }
}
