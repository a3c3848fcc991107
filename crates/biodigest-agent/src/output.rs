//! Digest output.
//!
//! A sink receives the finished tiered digest and the run metadata. Rendering
//! to HTML or sending mail is left to whatever reads the JSON document.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use biodigest_llm::DigestSummary;
use biodigest_ranker::TieredDigest;

/// Per-stage paper counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub fetched: usize,
    pub normalised: usize,
    pub batch_unique: usize,
    pub fresh: usize,
    pub recent: usize,
    pub heuristic_kept: usize,
    pub classified: usize,
    pub kept: usize,
    pub top_picks: usize,
    pub included: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub test_mode: bool,
    pub counts: StageCounts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_failures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<DigestSummary>,
}

#[async_trait]
pub trait DigestSink: Send + Sync {
    /// Deliver the digest. Returns a description of where it went.
    async fn emit(&self, digest: &TieredDigest, metadata: &RunMetadata) -> anyhow::Result<String>;
}

#[derive(Serialize)]
struct DigestDocument<'a> {
    metadata: &'a RunMetadata,
    #[serde(flatten)]
    digest: &'a TieredDigest,
}

/// Writes `digest-<YYYY-MM-DD>.json` into a directory.
pub struct JsonFileSink {
    directory: PathBuf,
}

impl JsonFileSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn path_for(&self, generated_at: DateTime<Utc>) -> PathBuf {
        self.directory.join(format!("digest-{}.json", generated_at.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl DigestSink for JsonFileSink {
    async fn emit(&self, digest: &TieredDigest, metadata: &RunMetadata) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.path_for(metadata.generated_at);
        let body = serde_json::to_vec_pretty(&DigestDocument { metadata, digest })?;
        tokio::fs::write(&path, body).await?;
        info!(path = %path.display(), included = metadata.counts.included, "Digest written");
        Ok(path.display().to_string())
    }
}
