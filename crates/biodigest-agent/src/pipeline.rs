//! Run orchestration.
//!
//! One call to [`DigestPipeline::run`] is one digest run:
//!
//!   fetch → normalise → batch dedup → recency → history dedup → heuristics
//!   → enrichment → classification → keep filter → combine → tiers
//!   → summary → ledger → sink
//!
//! Classification is the only concurrent stage and is a barrier: scoring
//! starts once every paper has a verdict or a fallback. Ledger errors are
//! fatal and are recorded as a failed run.

use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use biodigest_common::{Paper, SelectionConfig};
use biodigest_db::{HistoryLedger, LedgerMetadata, RunRecord};
use biodigest_ingestion::dedup::{dedup_batch, filter_seen};
use biodigest_ingestion::enrichment::Enrichers;
use biodigest_ingestion::normalise::normalise_batch;
use biodigest_ingestion::sources::{collect_records, RecordSource};
use biodigest_llm::{classify_batch, debug_verdict, DigestSummarizer, DigestSummary, PaperClassifier, RetryPolicy};
use biodigest_ranker::{select_tiers, HeuristicEngine, ScoreCombiner, TieredDigest};

use crate::config::Config;
use crate::output::{DigestSink, RunMetadata, StageCounts};

/// Papers kept by heuristic score when a test run keeps nothing.
const TEST_BACKFILL_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Dry run: nothing is written to the ledger.
    pub test_mode: bool,
    /// Keep every paper at a neutral score instead of calling the classifier.
    pub skip_classification: bool,
    /// Ignore the ledger's history when deduplicating.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    NothingFetched,
    NothingNew,
    NothingKept,
    Produced,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub counts: StageCounts,
    pub source_failures: Vec<String>,
    pub digest: Option<TieredDigest>,
    pub summary: Option<DigestSummary>,
    /// Where the sink delivered the digest.
    pub location: Option<String>,
}

impl RunReport {
    fn no_op(run_id: Uuid, outcome: RunOutcome, counts: StageCounts, source_failures: Vec<String>) -> Self {
        Self { run_id, outcome, counts, source_failures, digest: None, summary: None, location: None }
    }
}

/// Everything the pipeline talks to.
pub struct Collaborators {
    pub sources: Vec<Box<dyn RecordSource>>,
    pub ledger: Arc<dyn HistoryLedger>,
    /// May be `None` only for runs with `skip_classification`.
    pub classifier: Option<Arc<dyn PaperClassifier>>,
    pub summarizer: Option<DigestSummarizer>,
    pub enrichers: Enrichers,
    pub sink: Box<dyn DigestSink>,
}

pub struct DigestPipeline {
    collab: Collaborators,
    heuristics: HeuristicEngine,
    combiner: ScoreCombiner,
    selection: SelectionConfig,
    bucket_order: Vec<String>,
    retry: RetryPolicy,
    concurrency: usize,
    recent_days: Option<u32>,
}

impl DigestPipeline {
    pub fn new(config: &Config, collab: Collaborators) -> anyhow::Result<Self> {
        let heuristics = HeuristicEngine::new(&config.rules, &config.buckets)
            .context("compiling rule term lists")?;
        Ok(Self {
            collab,
            heuristics,
            combiner: ScoreCombiner::new(config.scoring.clone()),
            selection: config.selection.clone(),
            bucket_order: config.bucket_order(),
            retry: config.llm.retry.clone(),
            concurrency: config.llm.concurrency,
            recent_days: config.features.recent_days,
        })
    }

    /// Run once. On error a failed run is logged to the ledger (outside test
    /// mode) and no digest is produced.
    pub async fn run(&self, opts: RunOptions) -> anyhow::Result<RunReport> {
        let run_id = Uuid::new_v4();
        info!(%run_id, test_mode = opts.test_mode, skip_classification = opts.skip_classification, force = opts.force, "Starting digest run");

        match self.execute(run_id, opts).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(%run_id, error = %format!("{e:#}"), "Digest run failed");
                if !opts.test_mode {
                    if let Err(log_err) = self.record_failure(run_id, format!("{e:#}")).await {
                        warn!(%run_id, error = %log_err, "Could not record failed run");
                    }
                }
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(%run_id))]
    async fn execute(&self, run_id: Uuid, opts: RunOptions) -> anyhow::Result<RunReport> {
        let mut counts = StageCounts::default();

        // ── Fetch ────────────────────────────────────────────────────────────
        let collected = collect_records(&self.collab.sources).await;
        let source_failures: Vec<String> = collected
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.source, f.error))
            .collect();
        counts.fetched = collected.records.len();
        if counts.fetched == 0 {
            warn!("No records fetched; nothing to do");
            return Ok(RunReport::no_op(run_id, RunOutcome::NothingFetched, counts, source_failures));
        }

        // ── Normalise & dedup ────────────────────────────────────────────────
        let normalised = normalise_batch(collected.records);
        counts.normalised = normalised.papers.len();

        let unique = dedup_batch(normalised.papers);
        counts.batch_unique = unique.kept.len();

        let recent = self.filter_recent(unique.kept);
        counts.recent = recent.len();

        let history = filter_seen(recent, self.collab.ledger.as_ref(), opts.force)
            .await
            .context("history ledger lookup")?;
        counts.fresh = history.fresh.len();

        // ── Heuristics ───────────────────────────────────────────────────────
        let screened = self.heuristics.filter_batch(history.fresh);
        counts.heuristic_kept = screened.kept.len();
        if screened.kept.is_empty() {
            info!(fresh = counts.fresh, "No new papers survived screening; nothing to do");
            return Ok(RunReport::no_op(run_id, RunOutcome::NothingNew, counts, source_failures));
        }

        // ── Enrich & classify ────────────────────────────────────────────────
        let enriched = self.collab.enrichers.enrich(screened.kept).await;
        let classified = self.classify(enriched, opts).await?;
        counts.classified = classified.len();

        // ── Keep filter ──────────────────────────────────────────────────────
        let (mut kept, mut rejected) = self.split_kept(classified);
        if kept.is_empty() && opts.test_mode {
            warn!("No papers kept; test mode backfills with the top heuristic scores");
            (kept, rejected) = backfill_by_heuristic(rejected);
        }
        counts.kept = kept.len();
        if kept.is_empty() {
            warn!(classified = counts.classified, "No relevant papers after classification; nothing to do");
            return Ok(RunReport::no_op(run_id, RunOutcome::NothingKept, counts, source_failures));
        }

        // ── Score & place ────────────────────────────────────────────────────
        let kept = self.combiner.combine(kept);
        let rejected = self.combiner.combine(rejected);

        let summary = match &self.collab.summarizer {
            Some(s) => Some(s.summarize(&kept).await),
            None => None,
        };

        let digest = select_tiers(kept, rejected, &self.bucket_order, &self.selection);
        counts.top_picks = digest.top_picks.len();
        counts.included = digest.included_count();

        // ── Persist & deliver ────────────────────────────────────────────────
        if !opts.test_mode {
            self.record_papers(&digest).await.context("recording processed papers")?;
        }

        let metadata = RunMetadata {
            run_id,
            generated_at: Utc::now(),
            test_mode: opts.test_mode,
            counts: counts.clone(),
            source_failures: source_failures.clone(),
            summary: summary.clone(),
        };
        let location = self.collab.sink.emit(&digest, &metadata).await.context("emitting digest")?;

        if !opts.test_mode {
            self.record_run(run_id, &counts, &digest).await.context("recording run")?;
        }

        info!(
            %run_id,
            fetched = counts.fetched,
            classified = counts.classified,
            kept = counts.kept,
            top_picks = counts.top_picks,
            included = counts.included,
            %location,
            "Digest run complete"
        );

        Ok(RunReport {
            run_id,
            outcome: RunOutcome::Produced,
            counts,
            source_failures,
            digest: Some(digest),
            summary,
            location: Some(location),
        })
    }

    fn filter_recent(&self, papers: Vec<Paper>) -> Vec<Paper> {
        let Some(days) = self.recent_days else {
            return papers;
        };
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let before = papers.len();
        let recent: Vec<Paper> = papers
            .into_iter()
            .filter(|p| match p.latest_timestamp() {
                Some(ts) if ts < cutoff => {
                    debug!(canonical_id = %p.canonical_id, %ts, "Older than recency window");
                    false
                }
                _ => true,
            })
            .collect();
        info!(days, kept = recent.len(), dropped = before - recent.len(), "Recency filter applied");
        recent
    }

    async fn classify(&self, papers: Vec<Paper>, opts: RunOptions) -> anyhow::Result<Vec<Paper>> {
        if opts.skip_classification {
            info!(papers = papers.len(), "Skipping classification; every paper kept at a neutral score");
            return Ok(papers
                .into_iter()
                .map(|p| {
                    let verdict = debug_verdict(&p);
                    p.with_verdict(verdict)
                })
                .collect());
        }
        let classifier = self
            .collab
            .classifier
            .as_deref()
            .context("no classifier configured; pass --skip-classify or configure [llm]")?;
        Ok(classify_batch(classifier, papers, &self.retry, self.concurrency).await)
    }

    fn split_kept(&self, papers: Vec<Paper>) -> (Vec<Paper>, Vec<Paper>) {
        let min = self.selection.min_relevance;
        let (kept, rejected): (Vec<Paper>, Vec<Paper>) = papers.into_iter().partition(|p| is_kept(p, min));

        let dropped = rejected.iter().filter(|p| !p.classifier_keep()).count();
        info!(
            kept = kept.len(),
            dropped_by_classifier = dropped,
            below_min_relevance = rejected.len() - dropped,
            min_relevance = min,
            "Keep filter applied"
        );
        (kept, rejected)
    }

    /// Drop the failed run's paper records, keep only its failure entry.
    async fn record_failure(&self, run_id: Uuid, error: String) -> anyhow::Result<()> {
        let ledger = &self.collab.ledger;
        ledger.discard_pending().await?;
        ledger.log_run(RunRecord::failure(run_id, error)).await?;
        ledger.flush().await?;
        Ok(())
    }

    async fn record_papers(&self, digest: &TieredDigest) -> anyhow::Result<()> {
        let ledger = &self.collab.ledger;
        for paper in digest.all() {
            let verdict = paper.verdict.as_ref();
            let metadata = LedgerMetadata {
                title: paper.title.clone(),
                relevance_score: paper.relevance_score(),
                final_score: paper.final_score,
                kept: paper.classifier_keep(),
                buckets: verdict.map(|v| v.buckets.iter().cloned().collect()).unwrap_or_default(),
                in_top_picks: paper.in_top_picks,
                placement: paper.placement.to_string(),
            };
            ledger.record(&paper.canonical_id, paper.version, metadata).await?;
        }
        Ok(())
    }

    async fn record_run(&self, run_id: Uuid, counts: &StageCounts, digest: &TieredDigest) -> anyhow::Result<()> {
        let ledger = &self.collab.ledger;
        ledger
            .log_run(RunRecord::success(run_id, counts.fetched, counts.kept, counts.top_picks, true))
            .await?;

        let keep_ratio = if counts.classified == 0 {
            0.0
        } else {
            counts.kept as f64 / counts.classified as f64
        };
        ledger.log_metric("papers_fetched", counts.fetched as f64).await?;
        ledger.log_metric("papers_kept", counts.kept as f64).await?;
        ledger.log_metric("keep_ratio", keep_ratio).await?;
        ledger.log_metric("top_picks", counts.top_picks as f64).await?;
        for (bucket, count) in bucket_distribution(digest, &self.bucket_order, self.selection.min_relevance) {
            ledger.log_metric(&format!("bucket_{bucket}"), count as f64).await?;
        }

        ledger.flush().await?;
        Ok(())
    }
}

/// Classifier bucket counts over kept papers (a paper counts once per bucket
/// it was tagged with), in configured bucket order, zero counts omitted.
fn bucket_distribution(digest: &TieredDigest, bucket_order: &[String], min_relevance: f64) -> Vec<(String, usize)> {
    bucket_order
        .iter()
        .map(|name| {
            let n = digest
                .all()
                .filter(|p| is_kept(p, min_relevance) && p.has_bucket(name))
                .count();
            (name.clone(), n)
        })
        .filter(|(_, n)| *n > 0)
        .collect()
}

fn is_kept(paper: &Paper, min_relevance: f64) -> bool {
    paper.classifier_keep() && paper.relevance_score() >= min_relevance
}

/// Keep the top papers by heuristic score (stable), overriding their verdict.
fn backfill_by_heuristic(mut papers: Vec<Paper>) -> (Vec<Paper>, Vec<Paper>) {
    papers.sort_by(|a, b| b.heuristic.score.total_cmp(&a.heuristic.score));
    let rest = papers.split_off(TEST_BACKFILL_COUNT.min(papers.len()));
    let kept = papers
        .into_iter()
        .map(|mut p| {
            let mut verdict = p.verdict.take().unwrap_or_default();
            verdict.keep = true;
            verdict.relevance_score = p.heuristic.score;
            verdict.why_it_matters = "Debug: kept based on heuristic score".to_string();
            p.with_verdict(verdict)
        })
        .collect();
    (kept, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use biodigest_common::{ClassifierVerdict, SourceKind};

    fn with_heuristic(id: &str, score: f64) -> Paper {
        let mut p = Paper::new(id, SourceKind::PubMed, id).with_verdict(ClassifierVerdict {
            keep: false,
            relevance_score: 5.0,
            ..Default::default()
        });
        p.heuristic.score = score;
        p
    }

    #[test]
    fn test_backfill_takes_top_ten_by_heuristic() {
        let papers: Vec<Paper> = (0..12).map(|i| with_heuristic(&format!("pmid:{i}"), i as f64 * 5.0)).collect();
        let (kept, rest) = backfill_by_heuristic(papers);
        assert_eq!(kept.len(), 10);
        assert_eq!(rest.len(), 2);
        assert_eq!(kept[0].canonical_id, "pmid:11");
        assert!(kept.iter().all(|p| p.classifier_keep()));
        assert_eq!(kept[0].relevance_score(), 55.0);
        assert_eq!(rest[1].canonical_id, "pmid:0");
    }

    #[test]
    fn test_bucket_distribution_counts_kept_tags() {
        let tagged = |id: &str, keep: bool, relevance_score: f64, buckets: &[&str]| {
            Paper::new(id, SourceKind::Arxiv, id).with_verdict(ClassifierVerdict {
                keep,
                relevance_score,
                buckets: buckets.iter().map(|b| b.to_string()).collect(),
                ..Default::default()
            })
        };
        let digest = TieredDigest {
            top_picks: vec![tagged("a", true, 70.0, &["Drug Discovery", "Medical Imaging"])],
            noteworthy: vec![tagged("b", true, 50.0, &["Drug Discovery"])],
            excluded: vec![
                tagged("c", false, 90.0, &["Drug Discovery"]),
                tagged("d", true, 20.0, &["Drug Discovery", "Neurotech & BCI"]),
            ],
            ..Default::default()
        };
        let order = vec!["Medical Imaging".to_string(), "Drug Discovery".to_string(), "Neurotech & BCI".to_string()];
        assert_eq!(
            bucket_distribution(&digest, &order, 50.0),
            vec![("Medical Imaging".to_string(), 1), ("Drug Discovery".to_string(), 2)]
        );
    }
}
