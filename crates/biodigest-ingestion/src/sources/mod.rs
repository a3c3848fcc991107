//! Fetch collaborators.
//!
//! Each source produces raw records in its own shape. Sources are queried in
//! the configured order; a failing source contributes zero records and an
//! entry in the report, and never aborts the run.

pub mod arxiv;
pub mod biorxiv;
pub mod pubmed;

use async_trait::async_trait;
use tracing::{error, info, instrument};

use crate::models::RawRecord;

pub use arxiv::ArxivClient;
pub use biorxiv::BioRxivClient;
pub use pubmed::PubMedClient;

/// Common interface for all record sources.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Short label for logs and the run report, e.g. `"pubmed"`.
    fn name(&self) -> &str;

    /// Everything this source has for the current run. Pagination and
    /// per-request retries are the source's own business.
    async fn fetch(&self) -> anyhow::Result<Vec<RawRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// All records fetched this run, in source order then per-source order.
#[derive(Debug, Default)]
pub struct CollectReport {
    pub records: Vec<RawRecord>,
    pub per_source: Vec<(String, usize)>,
    pub failures: Vec<SourceFailure>,
}

#[instrument(skip(sources), fields(sources = sources.len()))]
pub async fn collect_records(sources: &[Box<dyn RecordSource>]) -> CollectReport {
    let mut report = CollectReport::default();

    for source in sources {
        match source.fetch().await {
            Ok(records) => {
                info!(source = source.name(), count = records.len(), "Fetched records");
                report.per_source.push((source.name().to_string(), records.len()));
                report.records.extend(records);
            }
            Err(e) => {
                error!(source = source.name(), error = %e, "Source failed; continuing without it");
                report.per_source.push((source.name().to_string(), 0));
                report.failures.push(SourceFailure {
                    source: source.name().to_string(),
                    error: format!("{e:#}"),
                });
            }
        }
    }

    info!(total = report.records.len(), failed = report.failures.len(), "Collection complete");
    report
}
