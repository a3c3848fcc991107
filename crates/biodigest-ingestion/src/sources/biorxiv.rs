//! bioRxiv / medRxiv preprint client.
//!
//! Uses the details API:
//!   https://api.biorxiv.org/details/{server}/{from}/{to}/{cursor}
//!
//! Pages hold up to 100 items; a short page ends the walk.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, instrument, warn};

use biodigest_common::sandbox::SandboxClient as Client;

use crate::models::{BioRxivRecord, PreprintServer, RawRecord};
use super::RecordSource;

const DETAILS_URL: &str = "https://api.biorxiv.org/details";
const PAGE_SIZE: usize = 100;
/// Upper bound on pages per run so a misbehaving cursor cannot loop forever.
const MAX_PAGES: usize = 100;

pub struct BioRxivClient {
    client: Client,
    server: PreprintServer,
    base: String,
    days_lookback: u32,
    name: String,
}

impl BioRxivClient {
    pub fn new(server: PreprintServer, days_lookback: u32) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::new()?,
            server,
            base: DETAILS_URL.to_string(),
            days_lookback: days_lookback.max(1),
            name: server.as_str().to_string(),
        })
    }

    pub fn new_biorxiv(days_lookback: u32) -> anyhow::Result<Self> {
        Self::new(PreprintServer::BioRxiv, days_lookback)
    }

    pub fn new_medrxiv(days_lookback: u32) -> anyhow::Result<Self> {
        Self::new(PreprintServer::MedRxiv, days_lookback)
    }

    /// Point at a different API root (mirrors, local fixtures).
    pub fn with_base_url(mut self, base: &str) -> anyhow::Result<Self> {
        self.client.allow_url_host(base)?;
        self.base = base.trim_end_matches('/').to_string();
        Ok(self)
    }

    fn interval(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today - Duration::days(i64::from(self.days_lookback)), today)
    }

    #[instrument(skip(self), fields(server = self.server.as_str()))]
    async fn fetch_window(&self, from: NaiveDate, to: NaiveDate) -> anyhow::Result<Vec<BioRxivRecord>> {
        let mut records = Vec::new();
        let mut cursor = 0usize;

        for _ in 0..MAX_PAGES {
            let url = format!("{}/{}/{from}/{to}/{cursor}", self.base, self.server.as_str());
            let resp = self.client.get(&url)?.send().await?.error_for_status()?;
            let body: serde_json::Value = resp.json().await?;

            let page = parse_details_page(&body, self.server);
            let page_len = page_size(&body);
            debug!(cursor, items = page_len, parsed = page.len(), "bioRxiv page");
            records.extend(page);

            if page_len < PAGE_SIZE {
                return Ok(records);
            }
            cursor += page_len;
        }

        warn!(pages = MAX_PAGES, "Page limit reached; results truncated");
        Ok(records)
    }
}

#[async_trait]
impl RecordSource for BioRxivClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> anyhow::Result<Vec<RawRecord>> {
        let (from, to) = self.interval(Utc::now().date_naive());
        let records = self.fetch_window(from, to).await?;
        Ok(records.into_iter().map(RawRecord::BioRxiv).collect())
    }
}

fn page_size(body: &serde_json::Value) -> usize {
    body["collection"].as_array().map(Vec::len).unwrap_or(0)
}

/// Parse one details-API page. Items without a DOI are skipped since the
/// preprint servers have no other identifier.
fn parse_details_page(body: &serde_json::Value, server: PreprintServer) -> Vec<BioRxivRecord> {
    let Some(items) = body["collection"].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let mut item = item.clone();
            if let Some(obj) = item.as_object_mut() {
                // Server is known from the request; the API's own spelling varies.
                obj.remove("server");
                // The version sometimes arrives as a number.
                if let Some(v) = obj.get("version").and_then(|v| v.as_u64()) {
                    obj.insert("version".into(), serde_json::Value::String(v.to_string()));
                }
            }
            match serde_json::from_value::<BioRxivRecord>(item) {
                Ok(mut record) => {
                    record.server = server;
                    Some(record)
                }
                Err(e) => {
                    warn!(error = %e, "Skipping malformed bioRxiv item");
                    None
                }
            }
        })
        .filter(|r| r.doi.as_deref().map(|d| !d.trim().is_empty()).unwrap_or(false))
        .collect()
}
