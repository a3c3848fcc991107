//! Raw records as produced by the fetch collaborators.
//!
//! Source-shaped data never travels past the normaliser: every variant here
//! is turned into a `Paper` (or dropped) in `normalise`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use biodigest_common::SourceKind;

/// A record from one source, in that source's native shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum RawRecord {
    Arxiv(ArxivRecord),
    PubMed(PubMedRecord),
    BioRxiv(BioRxivRecord),
}

impl RawRecord {
    pub fn source(&self) -> SourceKind {
        match self {
            RawRecord::Arxiv(_)  => SourceKind::Arxiv,
            RawRecord::PubMed(_) => SourceKind::PubMed,
            RawRecord::BioRxiv(r) => match r.server {
                PreprintServer::BioRxiv => SourceKind::BioRxiv,
                PreprintServer::MedRxiv => SourceKind::MedRxiv,
            },
        }
    }

    /// Best human-readable handle for log lines about this record.
    pub fn describe(&self) -> String {
        let (id, title) = match self {
            RawRecord::Arxiv(r)   => (r.id.as_deref(), r.title.as_deref()),
            RawRecord::PubMed(r)  => (r.pmid.as_deref(), r.title.as_deref()),
            RawRecord::BioRxiv(r) => (r.doi.as_deref(), r.title.as_deref()),
        };
        let title: String = title.unwrap_or("").chars().take(60).collect();
        format!("{}:{} {:?}", self.source(), id.unwrap_or("?"), title)
    }
}

/// arXiv Atom / search API entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArxivRecord {
    /// e.g. `2501.01234v2`; the trailing `vN` carries the version.
    pub id: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub abs_url: Option<String>,
    pub pdf_url: Option<String>,
    pub comment: Option<String>,
}

/// One `<AbstractText>` element, optionally labelled (BACKGROUND, METHODS, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbstractSection {
    pub label: Option<String>,
    pub text: String,
}

/// PubMed efetch article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PubMedRecord {
    pub pmid: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub abstract_sections: Vec<AbstractSection>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub journal: Option<String>,
    #[serde(default)]
    pub mesh_terms: Vec<String>,
    pub published: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprintServer {
    #[default]
    BioRxiv,
    MedRxiv,
}

impl PreprintServer {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreprintServer::BioRxiv => "biorxiv",
            PreprintServer::MedRxiv => "medrxiv",
        }
    }
}

/// bioRxiv / medRxiv details-API item. Fields are kept as the API's strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BioRxivRecord {
    #[serde(default)]
    pub server: PreprintServer,
    pub doi: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Semicolon-separated author list.
    pub authors: Option<String>,
    pub category: Option<String>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    /// `"2"` or `"v2"`
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_per_variant() {
        let med = RawRecord::BioRxiv(BioRxivRecord { server: PreprintServer::MedRxiv, ..Default::default() });
        assert_eq!(med.source(), SourceKind::MedRxiv);
        assert_eq!(RawRecord::PubMed(PubMedRecord::default()).source(), SourceKind::PubMed);
    }

    #[test]
    fn test_biorxiv_record_from_api_json() {
        let item = serde_json::json!({
            "doi": "10.1101/2025.01.02.123456",
            "title": "A title",
            "abstract": "Some abstract",
            "authors": "Doe, J.; Roe, R.",
            "category": "bioinformatics",
            "date": "2025-01-02",
            "version": "2"
        });
        let record: BioRxivRecord = serde_json::from_value(item).unwrap();
        assert_eq!(record.server, PreprintServer::BioRxiv);
        assert_eq!(record.abstract_text.as_deref(), Some("Some abstract"));
        assert_eq!(record.version.as_deref(), Some("2"));
    }

    #[test]
    fn test_describe_truncates_title() {
        let r = RawRecord::Arxiv(ArxivRecord {
            id: Some("2501.00001v1".into()),
            title: Some("x".repeat(200)),
            ..Default::default()
        });
        assert!(r.describe().len() < 120);
        assert!(r.describe().starts_with("arxiv:2501.00001v1"));
    }
}
