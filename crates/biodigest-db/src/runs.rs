//! Run and metric records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One digest run, successful or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub run_at: DateTime<Utc>,
    pub papers_fetched: usize,
    pub papers_kept: usize,
    pub top_picks_count: usize,
    pub digest_produced: bool,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn success(
        run_id: Uuid,
        papers_fetched: usize,
        papers_kept: usize,
        top_picks_count: usize,
        digest_produced: bool,
    ) -> Self {
        Self {
            run_id,
            run_at: Utc::now(),
            papers_fetched,
            papers_kept,
            top_picks_count,
            digest_produced,
            error: None,
        }
    }

    pub fn failure(run_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            run_id,
            run_at: Utc::now(),
            papers_fetched: 0,
            papers_kept: 0,
            top_picks_count: 0,
            digest_produced: false,
            error: Some(error.into()),
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// A named numeric metric attached to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: f64,
}

impl MetricRecord {
    pub fn now(name: impl Into<String>, value: f64) -> Self {
        Self { timestamp: Utc::now(), name: name.into(), value }
    }
}
