//! Deduplication of normalised papers.
//!
//! Stage 1 (batch): first occurrence of each `canonical_id` wins, in arrival
//! order. Versions are not compared here.
//! Stage 2 (history): a paper is dropped if the ledger already recorded its
//! id at a version >= the paper's. `force` skips this stage only.

use std::collections::HashSet;

use tracing::{debug, info, instrument};

use biodigest_common::Paper;
use biodigest_db::{DbError, HistoryLedger};

/// Result of stage 1.
#[derive(Debug, Default)]
pub struct BatchDedup {
    pub kept: Vec<Paper>,
    /// Canonical ids of later arrivals that were discarded.
    pub duplicates: Vec<String>,
}

/// Result of stage 2.
#[derive(Debug, Default)]
pub struct HistoryDedup {
    pub fresh: Vec<Paper>,
    pub already_seen: Vec<String>,
}

/// Keep the first occurrence of each canonical id.
pub fn dedup_batch(papers: Vec<Paper>) -> BatchDedup {
    let mut seen: HashSet<String> = HashSet::with_capacity(papers.len());
    let mut out = BatchDedup::default();

    for paper in papers {
        if seen.insert(paper.canonical_id.clone()) {
            out.kept.push(paper);
        } else {
            debug!(canonical_id = %paper.canonical_id, version = paper.version, "Duplicate within batch");
            out.duplicates.push(paper.canonical_id);
        }
    }

    info!(kept = out.kept.len(), duplicates = out.duplicates.len(), "Batch dedup complete");
    out
}

/// Drop papers whose `(canonical_id, version)` the ledger has already seen.
#[instrument(skip(papers, ledger), fields(count = papers.len()))]
pub async fn filter_seen(
    papers: Vec<Paper>,
    ledger: &dyn HistoryLedger,
    force: bool,
) -> Result<HistoryDedup, DbError> {
    if force {
        info!("Force mode: history dedup bypassed");
        return Ok(HistoryDedup { fresh: papers, already_seen: Vec::new() });
    }

    let mut out = HistoryDedup::default();
    for paper in papers {
        if ledger.has_seen(&paper.canonical_id, paper.version).await? {
            debug!(canonical_id = %paper.canonical_id, version = paper.version, "Already processed");
            out.already_seen.push(paper.canonical_id);
        } else {
            out.fresh.push(paper);
        }
    }

    info!(fresh = out.fresh.len(), already_seen = out.already_seen.len(), "History dedup complete");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use biodigest_common::SourceKind;
    use biodigest_db::{InMemoryLedger, LedgerMetadata};

    fn paper(id: &str, version: u32, title: &str) -> Paper {
        let mut p = Paper::new(id, SourceKind::BioRxiv, title);
        p.version = version;
        p
    }

    fn ids(papers: &[Paper]) -> Vec<&str> {
        papers.iter().map(|p| p.canonical_id.as_str()).collect()
    }

    #[test]
    fn test_first_seen_wins() {
        let out = dedup_batch(vec![
            paper("doi:10.1/a", 1, "first"),
            paper("doi:10.1/b", 1, "other"),
            paper("doi:10.1/a", 1, "second"),
        ]);
        assert_eq!(ids(&out.kept), vec!["doi:10.1/a", "doi:10.1/b"]);
        assert_eq!(out.kept[0].title, "first");
        assert_eq!(out.duplicates, vec!["doi:10.1/a".to_string()]);
    }

    #[test]
    fn test_batch_dedup_idempotent() {
        let batch = vec![
            paper("pmid:1", 1, "a"),
            paper("pmid:1", 1, "a"),
            paper("pmid:2", 1, "b"),
        ];
        let once = dedup_batch(batch).kept;
        let twice = dedup_batch(once.clone()).kept;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_stage_one_ignores_version_stage_two_uses_it() {
        // Two records share a DOI at v1 then v2; stage 1 keeps the v1 arrival.
        let batch = vec![
            paper("doi:10.1101/x", 1, "v1"),
            paper("pmid:9", 1, "unrelated"),
            paper("doi:10.1101/x", 2, "v2"),
        ];
        let stage1 = dedup_batch(batch);
        assert_eq!(stage1.kept.len(), 2);
        assert_eq!(stage1.kept[0].version, 1);

        let ledger = InMemoryLedger::new();
        ledger.record("doi:10.1101/x", 1, LedgerMetadata::default()).await.unwrap();

        let stage2 = filter_seen(stage1.kept, &ledger, false).await.unwrap();
        assert_eq!(ids(&stage2.fresh), vec!["pmid:9"]);
        assert_eq!(stage2.already_seen, vec!["doi:10.1101/x".to_string()]);

        // A genuinely newer version passes stage 2.
        let newer = filter_seen(vec![paper("doi:10.1101/x", 2, "v2")], &ledger, false).await.unwrap();
        assert_eq!(newer.fresh.len(), 1);
    }

    #[tokio::test]
    async fn test_force_bypasses_history() {
        let ledger = InMemoryLedger::new();
        ledger.record("pmid:1", 3, LedgerMetadata::default()).await.unwrap();
        let out = filter_seen(vec![paper("pmid:1", 1, "old")], &ledger, true).await.unwrap();
        assert_eq!(out.fresh.len(), 1);
        assert!(out.already_seen.is_empty());
    }
}
