//! Pipeline configuration consumed by the core stages.
//!
//! Each stage receives its own section by reference at construction time;
//! nothing reads ambient global state. All fields carry serde defaults so a
//! partial TOML file deserialises cleanly.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{DigestError, Result};

// ── Buckets ───────────────────────────────────────────────────────────────────

/// A topic bucket: a display name plus the keywords that suggest it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketDef {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl BucketDef {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Default ordered bucket list. Order is significant: the tiered selector
/// assigns each paper to the first listed bucket it qualifies for.
pub fn default_buckets() -> Vec<BucketDef> {
    vec![
        BucketDef::new("Medical Imaging", &["radiology", "MRI", "CT", "histopathology", "medical imaging", "segmentation"]),
        BucketDef::new("Drug Discovery", &["drug discovery", "virtual screening", "molecule generation", "ADMET", "binding affinity"]),
        BucketDef::new("Protein & Molecular Modeling", &["protein", "AlphaFold", "protein folding", "molecular dynamics", "enzyme design"]),
        BucketDef::new("Clinical NLP & LLMs", &["clinical notes", "EHR", "electronic health records", "medical question answering", "large language model"]),
        BucketDef::new("Neurotech & BCI", &["brain-computer interface", "BCI", "neural decoding", "neuroprosthetic", "EEG"]),
        BucketDef::new("Biosignals & Wearables", &["ECG", "fNIRS", "wearable", "biosignal", "photoplethysmography"]),
    ]
}

/// Bucket names must be unique and non-empty.
pub fn validate_buckets(buckets: &[BucketDef]) -> Result<()> {
    let mut seen = HashSet::new();
    for bucket in buckets {
        if bucket.name.trim().is_empty() {
            return Err(DigestError::Config("bucket name must not be empty".into()));
        }
        if !seen.insert(bucket.name.as_str()) {
            return Err(DigestError::Config(format!("duplicate bucket name: {}", bucket.name)));
        }
    }
    Ok(())
}

// ── Rule terms ────────────────────────────────────────────────────────────────

/// Boost terms in three tiers. Each match scores 20 / 10 / 5 points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostTerms {
    #[serde(default = "default_boost_high")]
    pub high: Vec<String>,
    #[serde(default = "default_boost_medium")]
    pub medium: Vec<String>,
    #[serde(default = "default_boost_low")]
    pub low: Vec<String>,
}

fn strings(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

fn default_boost_high() -> Vec<String> {
    strings(&["clinical trial", "FDA", "foundation model", "AlphaFold", "brain-computer interface", "drug discovery"])
}
fn default_boost_medium() -> Vec<String> {
    strings(&["medical imaging", "electronic health records", "EHR", "biomarker", "protein structure", "EEG", "clinical NLP"])
}
fn default_boost_low() -> Vec<String> {
    strings(&["dataset", "benchmark", "open-source", "segmentation", "wearable"])
}

impl Default for BoostTerms {
    fn default() -> Self {
        Self {
            high: default_boost_high(),
            medium: default_boost_medium(),
            low: default_boost_low(),
        }
    }
}

/// Term lists driving the heuristic policy engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Off-topic terms. A match drops the paper unless any boost term matches.
    #[serde(default = "default_drop_terms")]
    pub drop_terms: Vec<String>,

    /// Borderline topics, kept only alongside a transferable-method keyword.
    #[serde(default = "default_greylist_terms")]
    pub greylist_terms: Vec<String>,

    /// Transferable-method keywords that rescue a greylisted paper.
    #[serde(default = "default_greylist_keep_if")]
    pub greylist_keep_if: Vec<String>,

    #[serde(default)]
    pub boost: BoostTerms,

    /// Generic AI/ML terms for the co-occurrence bonus.
    #[serde(default = "default_ai_terms")]
    pub ai_terms: Vec<String>,

    /// Generic clinical/biomedical terms for the co-occurrence bonus.
    #[serde(default = "default_clinical_terms")]
    pub clinical_terms: Vec<String>,
}

fn default_drop_terms() -> Vec<String> {
    strings(&["veterinary", "livestock", "crop yield", "agriculture", "cryptocurrency", "stock market"])
}
fn default_greylist_terms() -> Vec<String> {
    strings(&["mouse model", "murine", "zebrafish", "in vitro", "rat model", "cell line"])
}
fn default_greylist_keep_if() -> Vec<String> {
    strings(&["deep learning", "machine learning", "neural network", "transformer", "foundation model", "transfer learning"])
}
fn default_ai_terms() -> Vec<String> {
    strings(&["machine learning", "deep learning", "neural network", "AI"])
}
fn default_clinical_terms() -> Vec<String> {
    strings(&["medical", "clinical", "patient", "drug", "protein", "diagnostic", "healthcare"])
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            drop_terms: default_drop_terms(),
            greylist_terms: default_greylist_terms(),
            greylist_keep_if: default_greylist_keep_if(),
            boost: BoostTerms::default(),
            ai_terms: default_ai_terms(),
            clinical_terms: default_clinical_terms(),
        }
    }
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Keep-floor and tiering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Number of top-scored papers carved off as top picks.
    #[serde(default = "default_top_picks")]
    pub top_picks_count: usize,

    /// Minimum final score for the catch-all noteworthy list.
    #[serde(default = "default_noteworthy_threshold")]
    pub noteworthy_threshold: f64,

    /// Minimum classifier relevance for a `keep=true` paper to be kept.
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,
}

fn default_top_picks() -> usize { 5 }
fn default_noteworthy_threshold() -> f64 { 60.0 }
fn default_min_relevance() -> f64 { 50.0 }

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_picks_count: default_top_picks(),
            noteworthy_threshold: default_noteworthy_threshold(),
            min_relevance: default_min_relevance(),
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("noteworthy_threshold", self.noteworthy_threshold),
            ("min_relevance", self.min_relevance),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(DigestError::Config(format!("{name} must lie in [0, 100], got {value}")));
            }
        }
        Ok(())
    }
}
