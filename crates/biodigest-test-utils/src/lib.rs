//! Shared fixtures for biodigest tests: a paper builder and a scripted
//! classifier that never touches the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use biodigest_common::{ClassifierVerdict, HeuristicAnnotation, Paper, SourceKind};
use biodigest_llm::{ClassifyError, PaperClassifier};

pub use biodigest_db::InMemoryLedger;

/// Fluent construction of fully annotated papers.
#[derive(Debug, Clone)]
pub struct PaperBuilder {
    paper: Paper,
}

impl PaperBuilder {
    pub fn new(canonical_id: &str) -> Self {
        Self { paper: Paper::new(canonical_id, SourceKind::Arxiv, canonical_id) }
    }

    pub fn source(mut self, source: SourceKind) -> Self {
        self.paper.source = source;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.paper.version = version;
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.paper.title = title.to_string();
        self
    }

    pub fn abstract_text(mut self, text: &str) -> Self {
        self.paper.abstract_text = text.to_string();
        self
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.paper.published_at = Some(at);
        self
    }

    pub fn code(mut self, url: &str) -> Self {
        self.paper.links.code.insert(url.to_string());
        self
    }

    pub fn dataset(mut self, url: &str) -> Self {
        self.paper.links.datasets.insert(url.to_string());
        self
    }

    pub fn heuristic(mut self, score: f64, greylisted: bool) -> Self {
        self.paper.heuristic = HeuristicAnnotation {
            score,
            detected_buckets: self.paper.heuristic.detected_buckets,
            greylisted,
        };
        self
    }

    /// A `keep = true` verdict at `relevance` with the given buckets.
    pub fn kept(self, relevance: f64, buckets: &[&str]) -> Self {
        self.verdict(verdict(true, relevance, buckets))
    }

    pub fn verdict(mut self, verdict: ClassifierVerdict) -> Self {
        self.paper = self.paper.with_verdict(verdict);
        self
    }

    pub fn final_score(mut self, score: f64) -> Self {
        self.paper.final_score = score;
        self
    }

    pub fn build(self) -> Paper {
        self.paper
    }
}

pub fn verdict(keep: bool, relevance: f64, buckets: &[&str]) -> ClassifierVerdict {
    ClassifierVerdict {
        keep,
        relevance_score: relevance,
        buckets: buckets.iter().map(|b| b.to_string()).collect(),
        why_it_matters: format!("relevance {relevance}"),
        summary: "stub".to_string(),
        ..Default::default()
    }
}

/// Classifier answering from a table keyed by canonical id. Unknown ids get
/// the default verdict; ids registered with `fail_with` return that error.
pub struct StubClassifier {
    verdicts: HashMap<String, ClassifierVerdict>,
    failures: HashMap<String, ClassifyError>,
    default: ClassifierVerdict,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new(verdict(false, 0.0, &[]))
    }
}

impl StubClassifier {
    pub fn new(default: ClassifierVerdict) -> Self {
        Self {
            verdicts: HashMap::new(),
            failures: HashMap::new(),
            default,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(mut self, canonical_id: &str, verdict: ClassifierVerdict) -> Self {
        self.verdicts.insert(canonical_id.to_string(), verdict);
        self
    }

    pub fn fail_with(mut self, canonical_id: &str, error: ClassifyError) -> Self {
        self.failures.insert(canonical_id.to_string(), error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Canonical ids classified so far, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaperClassifier for StubClassifier {
    async fn classify(&self, paper: &Paper) -> Result<ClassifierVerdict, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(paper.canonical_id.clone());
        }
        if let Some(err) = self.failures.get(&paper.canonical_id) {
            return Err(err.clone());
        }
        Ok(self
            .verdicts
            .get(&paper.canonical_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}
