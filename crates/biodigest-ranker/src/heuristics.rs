//! Heuristic policy engine.
//!
//! Per paper, over `title + " " + abstract`:
//!
//!   1. DROP      any drop term and no boost term (any tier)      → excluded
//!   2. GREYLIST  any greylist term: kept only with a keep-if term → `greylisted`
//!   3. SCORE     20 / 10 / 5 per high / medium / low boost occurrence,
//!                +20 when an AI term and a clinical term co-occur, capped at 100
//!   4. BUCKETS   every bucket with at least one matching keyword
//!
//! Matching is case-insensitive and word-boundary anchored. Every term list
//! is compiled once when the engine is built.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use biodigest_common::{BucketDef, DigestError, HeuristicAnnotation, Paper, Result, RulesConfig};

pub const HIGH_BOOST_POINTS: f64 = 20.0;
pub const MEDIUM_BOOST_POINTS: f64 = 10.0;
pub const LOW_BOOST_POINTS: f64 = 5.0;
pub const CO_OCCURRENCE_BONUS: f64 = 20.0;
pub const MAX_HEURISTIC_SCORE: f64 = 100.0;

/// A compiled list of whole-word, case-insensitive terms.
#[derive(Debug, Clone)]
pub struct TermSet {
    terms: Vec<(String, Regex)>,
}

impl TermSet {
    pub fn compile<S: AsRef<str>>(terms: &[S]) -> Result<Self> {
        let terms = terms
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .map(|t| {
                RegexBuilder::new(&format!(r"\b{}\b", regex::escape(t)))
                    .case_insensitive(true)
                    .build()
                    .map(|re| (t.to_string(), re))
                    .map_err(|e| DigestError::Config(format!("invalid term {t:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { terms })
    }

    /// First term that matches, if any.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.terms
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(t, _)| t.as_str())
    }

    pub fn any_match(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    /// Total occurrences of every term.
    pub fn count_occurrences(&self, text: &str) -> usize {
        self.terms.iter().map(|(_, re)| re.find_iter(text).count()).sum()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Outcome of evaluating one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum HeuristicDecision {
    Keep(HeuristicAnnotation),
    Drop { term: String },
    GreylistExcluded { term: String },
}

/// Papers partitioned by the engine.
#[derive(Debug, Default)]
pub struct HeuristicReport {
    pub kept: Vec<Paper>,
    pub dropped: usize,
    pub greylist_excluded: usize,
}

#[derive(Debug, Clone)]
pub struct HeuristicEngine {
    drop: TermSet,
    greylist: TermSet,
    greylist_keep_if: TermSet,
    high: TermSet,
    medium: TermSet,
    low: TermSet,
    ai: TermSet,
    clinical: TermSet,
    buckets: Vec<(String, TermSet)>,
}

impl HeuristicEngine {
    pub fn new(rules: &RulesConfig, buckets: &[BucketDef]) -> Result<Self> {
        Ok(Self {
            drop: TermSet::compile(&rules.drop_terms)?,
            greylist: TermSet::compile(&rules.greylist_terms)?,
            greylist_keep_if: TermSet::compile(&rules.greylist_keep_if)?,
            high: TermSet::compile(&rules.boost.high)?,
            medium: TermSet::compile(&rules.boost.medium)?,
            low: TermSet::compile(&rules.boost.low)?,
            ai: TermSet::compile(&rules.ai_terms)?,
            clinical: TermSet::compile(&rules.clinical_terms)?,
            buckets: buckets
                .iter()
                .map(|b| Ok((b.name.clone(), TermSet::compile(&b.keywords)?)))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    fn any_boost(&self, text: &str) -> bool {
        self.high.any_match(text) || self.medium.any_match(text) || self.low.any_match(text)
    }

    pub fn evaluate(&self, text: &str) -> HeuristicDecision {
        if let Some(term) = self.drop.first_match(text) {
            if !self.any_boost(text) {
                return HeuristicDecision::Drop { term: term.to_string() };
            }
        }

        let greylisted = match self.greylist.first_match(text) {
            Some(term) if !self.greylist_keep_if.any_match(text) => {
                return HeuristicDecision::GreylistExcluded { term: term.to_string() };
            }
            Some(_) => true,
            None => false,
        };

        HeuristicDecision::Keep(HeuristicAnnotation {
            score: self.score(text),
            detected_buckets: self.detect_buckets(text),
            greylisted,
        })
    }

    /// Boost points plus the co-occurrence bonus, capped at 100.
    pub fn score(&self, text: &str) -> f64 {
        let mut score = self.high.count_occurrences(text) as f64 * HIGH_BOOST_POINTS
            + self.medium.count_occurrences(text) as f64 * MEDIUM_BOOST_POINTS
            + self.low.count_occurrences(text) as f64 * LOW_BOOST_POINTS;

        if self.ai.any_match(text) && self.clinical.any_match(text) {
            score += CO_OCCURRENCE_BONUS;
        }
        score.min(MAX_HEURISTIC_SCORE)
    }

    /// Bucket names in configured order.
    pub fn detect_buckets(&self, text: &str) -> Vec<String> {
        self.buckets
            .iter()
            .filter(|(_, keywords)| keywords.any_match(text))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn filter_batch(&self, papers: Vec<Paper>) -> HeuristicReport {
        let total = papers.len();
        let mut report = HeuristicReport::default();

        for paper in papers {
            match self.evaluate(&paper.text()) {
                HeuristicDecision::Keep(annotation) => report.kept.push(paper.with_heuristic(annotation)),
                HeuristicDecision::Drop { term } => {
                    debug!(canonical_id = %paper.canonical_id, %term, "Dropped: hard-drop term");
                    report.dropped += 1;
                }
                HeuristicDecision::GreylistExcluded { term } => {
                    debug!(canonical_id = %paper.canonical_id, %term, "Dropped: greylisted without transferable method");
                    report.greylist_excluded += 1;
                }
            }
        }

        info!(
            total,
            kept = report.kept.len(),
            dropped = report.dropped,
            greylist_excluded = report.greylist_excluded,
            "Heuristic filter complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biodigest_common::config::default_buckets;
    use biodigest_common::BoostTerms;

    fn rules() -> RulesConfig {
        RulesConfig {
            drop_terms: vec!["veterinary".into()],
            greylist_terms: vec!["mouse model".into()],
            greylist_keep_if: vec!["transformer".into()],
            boost: BoostTerms {
                high: vec!["foundation model".into()],
                medium: vec!["EEG".into()],
                low: vec!["dataset".into()],
            },
            ..RulesConfig::default()
        }
    }

    fn engine() -> HeuristicEngine {
        HeuristicEngine::new(&rules(), &default_buckets()).unwrap()
    }

    fn keep(decision: HeuristicDecision) -> HeuristicAnnotation {
        match decision {
            HeuristicDecision::Keep(a) => a,
            other => panic!("expected keep, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_without_boost() {
        assert_eq!(
            engine().evaluate("A veterinary study of dogs"),
            HeuristicDecision::Drop { term: "veterinary".into() }
        );
    }

    #[test]
    fn test_boost_overrides_drop() {
        for boost in ["foundation model", "eeg", "Dataset"] {
            let text = format!("Veterinary {boost} study");
            assert!(matches!(engine().evaluate(&text), HeuristicDecision::Keep(_)), "{text}");
        }
    }

    #[test]
    fn test_greylist_gate() {
        assert!(matches!(
            engine().evaluate("Results in a mouse model of epilepsy"),
            HeuristicDecision::GreylistExcluded { .. }
        ));
        let a = keep(engine().evaluate("A transformer applied to a mouse model"));
        assert!(a.greylisted);
    }

    #[test]
    fn test_whole_word_matching() {
        // "EEGs" and "datasets" are not whole-word matches.
        let e = engine();
        assert_eq!(e.score("EEGs and datasets"), 0.0);
        assert_eq!(e.score("eeg EEG dataset"), 2.0 * 10.0 + 5.0);
        assert!(!e.drop.any_match("preveterinary"));
    }

    #[test]
    fn test_co_occurrence_bonus() {
        let a = keep(engine().evaluate("deep learning neural network diagnosis patient"));
        assert_eq!(a.score, 20.0);
        // AI term without clinical term gets nothing.
        assert_eq!(engine().score("deep learning for chess"), 0.0);
    }

    #[test]
    fn test_score_capped_at_100() {
        let text = "foundation model ".repeat(10);
        assert_eq!(engine().score(&text), 100.0);
    }

    #[test]
    fn test_detect_buckets_in_config_order() {
        let a = keep(engine().evaluate("Wearable ECG and EEG decoding"));
        assert_eq!(a.detected_buckets, vec!["Neurotech & BCI".to_string(), "Biosignals & Wearables".to_string()]);
    }

    #[test]
    fn test_filter_batch_counts() {
        use biodigest_common::SourceKind;
        let mut a = Paper::new("pmid:1", SourceKind::PubMed, "veterinary care");
        a.abstract_text = "cattle".into();
        let b = Paper::new("pmid:2", SourceKind::PubMed, "mouse model only");
        let c = Paper::new("pmid:3", SourceKind::PubMed, "EEG foundation model");

        let report = engine().filter_batch(vec![a, b, c]);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.greylist_excluded, 1);
        assert_eq!(report.kept.len(), 1);
        assert_eq!(report.kept[0].heuristic.score, 30.0);
    }

    #[test]
    fn test_empty_terms_ignored() {
        let set = TermSet::compile(&["", "  ", "AI"]).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.any_match("an AI system"));
        assert!(!set.any_match("said"));
    }
}
