//! JSON-file backed ledger.
//!
//! The whole ledger is one JSON document. It is read once on open, kept in
//! memory for the run, and written back on `flush` via a temp file + rename
//! so a crash mid-write never leaves a truncated ledger behind. Writes made
//! after the last flush can be dropped with `discard_pending`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{DbError, Result};
use crate::ledger::{HistoryLedger, LedgerMetadata, LedgerState, StagedState};
use crate::runs::{MetricRecord, RunRecord};

pub struct JsonFileLedger {
    path: PathBuf,
    state: RwLock<StagedState>,
}

impl JsonFileLedger {
    /// Open the ledger at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => LedgerState::default(),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| DbError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No ledger file yet, starting empty");
                LedgerState::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), papers = state.papers.len(), runs = state.runs.len(), "Ledger opened");
        Ok(Self { path, state: RwLock::new(StagedState::new(state)) })
    }

    /// Delete the ledger file. Used by `--reset-db`.
    pub async fn reset(path: impl AsRef<Path>) -> Result<()> {
        match tokio::fs::remove_file(path.as_ref()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.state.read().await.working.clone()
    }
}

#[async_trait]
impl HistoryLedger for JsonFileLedger {
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
        let mut state = self.state.write().await;
        let json = serde_json::to_string_pretty(&state.working)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        state.commit();
        debug!(path = %self.path.display(), "Ledger flushed");
        Ok(())
    }

    async fn discard_pending(&self) -> Result<()> {
        let dropped = self.state.write().await.rollback();
        debug!(path = %self.path.display(), dropped, "Pending ledger writes discarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonFileLedger::open(dir.path().join("ledger.json")).await.unwrap();
        assert!(ledger.snapshot().await.papers.is_empty());
    }

    #[tokio::test]
    async fn test_flush_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");

        let ledger = JsonFileLedger::open(&path).await.unwrap();
        ledger.record("doi:10.1101/2025.01.01.000001", 2, LedgerMetadata {
            title: "A paper".into(),
            kept: true,
            ..Default::default()
        }).await.unwrap();
        ledger.log_metric("papers_fetched", 3.0).await.unwrap();
        ledger.flush().await.unwrap();

        let reopened = JsonFileLedger::open(&path).await.unwrap();
        assert!(reopened.has_seen("doi:10.1101/2025.01.01.000001", 2).await.unwrap());
        assert!(!reopened.has_seen("doi:10.1101/2025.01.01.000001", 3).await.unwrap());
        let state = reopened.snapshot().await;
        assert_eq!(state.metrics.len(), 1);
        assert_eq!(state.papers["doi:10.1101/2025.01.01.000001"].metadata.title, "A paper");
    }

    #[tokio::test]
    async fn test_discarded_records_never_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = JsonFileLedger::open(&path).await.unwrap();
        ledger.record("pmid:100", 1, LedgerMetadata::default()).await.unwrap();
        ledger.flush().await.unwrap();

        ledger.record("pmid:200", 1, LedgerMetadata::default()).await.unwrap();
        ledger.discard_pending().await.unwrap();
        ledger.log_run(RunRecord::failure(uuid::Uuid::new_v4(), "sink down")).await.unwrap();
        ledger.flush().await.unwrap();

        let reopened = JsonFileLedger::open(&path).await.unwrap();
        assert!(reopened.has_seen("pmid:100", 1).await.unwrap());
        assert!(!reopened.has_seen("pmid:200", 1).await.unwrap());
        let state = reopened.snapshot().await;
        assert_eq!(state.runs.len(), 1);
        assert!(state.runs[0].error.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(matches!(JsonFileLedger::open(&path).await, Err(DbError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_reset_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = JsonFileLedger::open(&path).await.unwrap();
        ledger.flush().await.unwrap();
        assert!(path.exists());
        JsonFileLedger::reset(&path).await.unwrap();
        assert!(!path.exists());
        JsonFileLedger::reset(&path).await.unwrap();
    }
}
