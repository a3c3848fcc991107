//! History ledger contract and the in-memory implementation.
//!
//! `has_seen(id, v)` is true iff some earlier run recorded `id` at a version
//! `>= v`. Recording keeps the maximum version seen for each id.
//!
//! Writes are pending until `flush`; `discard_pending` drops them, so a run
//! that fails after recording its papers leaves no history behind.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{DbError, Result};
use crate::runs::{MetricRecord, RunRecord};

/// Per-paper metadata stored alongside the version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub title: String,
    pub relevance_score: f64,
    pub final_score: f64,
    pub kept: bool,
    pub buckets: Vec<String>,
    pub in_top_picks: bool,
    pub placement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: u32,
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: LedgerMetadata,
}

/// Everything a ledger persists. Also the on-disk JSON shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default)]
    pub papers: BTreeMap<String, LedgerEntry>,
    #[serde(default)]
    pub runs: Vec<RunRecord>,
    #[serde(default)]
    pub metrics: Vec<MetricRecord>,
}

impl LedgerState {
    pub fn has_seen(&self, canonical_id: &str, version: u32) -> bool {
        self.papers
            .get(canonical_id)
            .map(|entry| entry.version >= version)
            .unwrap_or(false)
    }

    pub fn record(&mut self, canonical_id: &str, version: u32, metadata: LedgerMetadata) -> Result<()> {
        if version == 0 {
            return Err(DbError::InvalidVersion { canonical_id: canonical_id.to_string(), version });
        }
        let entry = LedgerEntry { version, processed_at: Utc::now(), metadata };
        match self.papers.get(canonical_id) {
            Some(existing) if existing.version > version => {
                tracing::debug!(
                    canonical_id,
                    recorded = existing.version,
                    version,
                    "Older version not recorded over newer one"
                );
            }
            _ => {
                self.papers.insert(canonical_id.to_string(), entry);
            }
        }
        Ok(())
    }
}

/// Persisted record of previously processed papers.
///
/// Read once per paper during deduplication and written once at the end of
/// a successful run. A single writer per run is assumed.
#[async_trait]
pub trait HistoryLedger: Send + Sync {
    async fn has_seen(&self, canonical_id: &str, version: u32) -> Result<bool>;

    async fn record(&self, canonical_id: &str, version: u32, metadata: LedgerMetadata) -> Result<()>;

    async fn log_run(&self, run: RunRecord) -> Result<()>;

    async fn log_metric(&self, name: &str, value: f64) -> Result<()>;

    /// Commit everything written since the last flush.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Forget everything written since the last flush.
    async fn discard_pending(&self) -> Result<()> {
        Ok(())
    }
}

/// Working state plus the copy committed at the last flush.
#[derive(Debug, Default)]
pub(crate) struct StagedState {
    pub(crate) working: LedgerState,
    pub(crate) committed: LedgerState,
}

impl StagedState {
    pub(crate) fn new(state: LedgerState) -> Self {
        Self { working: state.clone(), committed: state }
    }

    pub(crate) fn commit(&mut self) {
        self.committed = self.working.clone();
    }

    /// Roll the working state back; returns how many paper records were dropped.
    pub(crate) fn rollback(&mut self) -> usize {
        let dropped = self.working.papers.len().saturating_sub(self.committed.papers.len());
        self.working = self.committed.clone();
        dropped
    }
}

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<StagedState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, pending writes included.
    pub async fn snapshot(&self) -> LedgerState {
        self.state.read().await.working.clone()
    }
}

#[async_trait]
impl HistoryLedger for InMemoryLedger {
    async fn has_seen(&self, canonical_id: &str, version: u32) -> Result<bool> {
        Ok(self.state.read().await.working.has_seen(canonical_id, version))
    }

    async fn record(&self, canonical_id: &str, version: u32, metadata: LedgerMetadata) -> Result<()> {
        self.state.write().await.working.record(canonical_id, version, metadata)
    }

    async fn log_run(&self, run: RunRecord) -> Result<()> {
        self.state.write().await.working.runs.push(run);
        Ok(())
    }

    async fn log_metric(&self, name: &str, value: f64) -> Result<()> {
        self.state.write().await.working.metrics.push(MetricRecord::now(name, value));
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.state.write().await.commit();
        Ok(())
    }

    async fn discard_pending(&self) -> Result<()> {
        self.state.write().await.rollback();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unseen_id() {
        let ledger = InMemoryLedger::new();
        assert!(!ledger.has_seen("doi:10.1/x", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_version_monotonicity() {
        let ledger = InMemoryLedger::new();
        ledger.record("arxiv:2501.00001", 2, LedgerMetadata::default()).await.unwrap();

        assert!(ledger.has_seen("arxiv:2501.00001", 1).await.unwrap());
        assert!(ledger.has_seen("arxiv:2501.00001", 2).await.unwrap());
        assert!(!ledger.has_seen("arxiv:2501.00001", 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_older_version_does_not_lower_record() {
        let ledger = InMemoryLedger::new();
        ledger.record("pmid:1", 3, LedgerMetadata::default()).await.unwrap();
        ledger.record("pmid:1", 1, LedgerMetadata::default()).await.unwrap();
        assert!(ledger.has_seen("pmid:1", 3).await.unwrap());
        assert_eq!(ledger.snapshot().await.papers["pmid:1"].version, 3);
    }

    #[tokio::test]
    async fn test_zero_version_rejected() {
        let ledger = InMemoryLedger::new();
        let err = ledger.record("pmid:1", 0, LedgerMetadata::default()).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidVersion { .. }));
    }

    #[tokio::test]
    async fn test_runs_and_metrics_logged() {
        let ledger = InMemoryLedger::new();
        ledger.log_run(RunRecord::failure(uuid::Uuid::new_v4(), "boom")).await.unwrap();
        ledger.log_metric("papers_kept", 7.0).await.unwrap();
        let state = ledger.snapshot().await;
        assert_eq!(state.runs.len(), 1);
        assert_eq!(state.metrics[0].name, "papers_kept");
    }

    #[tokio::test]
    async fn test_discard_pending_keeps_flushed_state() {
        let ledger = InMemoryLedger::new();
        ledger.record("pmid:1", 1, LedgerMetadata::default()).await.unwrap();
        ledger.flush().await.unwrap();

        ledger.record("pmid:2", 1, LedgerMetadata::default()).await.unwrap();
        ledger.record("pmid:1", 4, LedgerMetadata::default()).await.unwrap();
        ledger.discard_pending().await.unwrap();

        assert!(!ledger.has_seen("pmid:2", 1).await.unwrap());
        assert!(!ledger.has_seen("pmid:1", 2).await.unwrap());
        assert!(ledger.has_seen("pmid:1", 1).await.unwrap());

        ledger.log_run(RunRecord::failure(uuid::Uuid::new_v4(), "sink down")).await.unwrap();
        ledger.flush().await.unwrap();
        let state = ledger.snapshot().await;
        assert_eq!(state.papers.len(), 1);
        assert_eq!(state.runs.len(), 1);
    }
}
