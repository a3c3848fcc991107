//! Bounded, order-preserving batch classification.

use futures_util::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

use biodigest_common::{ClassifierVerdict, Paper};

use crate::classifier::PaperClassifier;
use crate::retry::{fallback_verdict, RetryPolicy};

/// Classify one paper, retrying transient failures. Never fails: once the
/// retry budget is spent, or on a malformed reply, the fallback verdict is
/// returned.
pub async fn classify_one_with_retry(
    classifier: &dyn PaperClassifier,
    paper: &Paper,
    policy: &RetryPolicy,
) -> ClassifierVerdict {
    let result = policy
        .run(&paper.canonical_id, || classifier.classify(paper), |e| e.is_retryable())
        .await;
    match result {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(canonical_id = %paper.canonical_id, error = %e, "Classification failed, using fallback verdict");
            fallback_verdict(&e.to_string())
        }
    }
}

/// Classify `papers` with at most `concurrency` calls in flight. Output
/// order matches input order.
#[instrument(skip(classifier, papers, policy), fields(papers = papers.len()))]
pub async fn classify_batch(
    classifier: &dyn PaperClassifier,
    papers: Vec<Paper>,
    policy: &RetryPolicy,
    concurrency: usize,
) -> Vec<Paper> {
    let classified: Vec<Paper> = stream::iter(papers)
        .map(|paper| async move {
            let verdict = classify_one_with_retry(classifier, &paper, policy).await;
            paper.with_verdict(verdict)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let failed = classified
        .iter()
        .filter(|p| p.verdict.as_ref().is_some_and(|v| v.error.is_some()))
        .count();
    let kept = classified.iter().filter(|p| p.classifier_keep()).count();
    info!(classified = classified.len(), kept, failed, "Classification complete");
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifyError;
    use crate::retry::FALLBACK_RELEVANCE;
    use async_trait::async_trait;
    use biodigest_common::SourceKind;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scores papers by the number in their id; ids containing "flaky" fail
    /// once, "down" always fails, "bad" is malformed. Later ids answer
    /// faster so completion order differs from input order.
    struct Scripted {
        calls: Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Scripted {
        fn new() -> Self {
            Self { calls: Mutex::new(HashMap::new()), in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) }
        }
        fn calls(&self, id: &str) -> usize {
            self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl PaperClassifier for Scripted {
        async fn classify(&self, paper: &Paper) -> Result<ClassifierVerdict, ClassifyError> {
            let id = paper.canonical_id.clone();
            let n = {
                let mut calls = self.calls.lock().unwrap();
                let c = calls.entry(id.clone()).or_default();
                *c += 1;
                *c
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let idx: u64 = id.trim_start_matches(|c: char| !c.is_ascii_digit()).parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(idx * 5))).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if id.contains("flaky") && n == 1 {
                return Err(ClassifyError::Transient("hiccup".into()));
            }
            if id.contains("down") {
                return Err(ClassifyError::Transient("unreachable".into()));
            }
            if id.contains("bad") {
                return Err(ClassifyError::Malformed("garbage".into()));
            }
            Ok(ClassifierVerdict { keep: true, relevance_score: 10.0 * idx as f64, ..Default::default() })
        }
    }

    fn papers(ids: &[&str]) -> Vec<Paper> {
        ids.iter().map(|id| Paper::new(*id, SourceKind::Arxiv, *id)).collect()
    }

    #[tokio::test]
    async fn test_order_preserved_and_bounded() {
        let clf = Scripted::new();
        let ids = ["p1", "p2", "p3", "p4", "p5", "p6"];
        let out = classify_batch(&clf, papers(&ids), &RetryPolicy::immediate(3), 2).await;

        let got: Vec<&str> = out.iter().map(|p| p.canonical_id.as_str()).collect();
        assert_eq!(got, ids);
        assert_eq!(out[2].relevance_score(), 30.0);
        assert!(clf.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_retry_and_fallback() {
        let clf = Scripted::new();
        let out = classify_batch(&clf, papers(&["flaky1", "down2", "bad3"]), &RetryPolicy::immediate(3), 3).await;

        assert_eq!(out[0].relevance_score(), 10.0);
        assert!(out[0].verdict.as_ref().unwrap().error.is_none());
        assert_eq!(clf.calls("flaky1"), 2);

        let down = out[1].verdict.as_ref().unwrap();
        assert!(down.keep);
        assert_eq!(down.relevance_score, FALLBACK_RELEVANCE);
        assert!(down.error.is_some());
        assert_eq!(clf.calls("down2"), 3);

        assert!(out[2].verdict.as_ref().unwrap().error.is_some());
        assert_eq!(clf.calls("bad3"), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let out = classify_batch(&Scripted::new(), Vec::new(), &RetryPolicy::default(), 4).await;
        assert!(out.is_empty());
    }
}
