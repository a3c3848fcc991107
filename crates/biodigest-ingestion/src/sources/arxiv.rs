//! arXiv API client.
//!
//! Endpoint used:
//!   query: https://export.arxiv.org/api/query (Atom feed)

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info, instrument, warn};

use biodigest_common::sandbox::SandboxClient as Client;

use crate::models::{ArxivRecord, RawRecord};
use super::RecordSource;

const QUERY_URL: &str = "https://export.arxiv.org/api/query";
const DEFAULT_MAX_RESULTS: usize = 200;
const ABS_PREFIXES: &[&str] = &["http://arxiv.org/abs/", "https://arxiv.org/abs/"];

pub struct ArxivClient {
    client: Client,
    base_url: String,
    categories: Vec<String>,
    days_lookback: u32,
    max_results: usize,
}

impl ArxivClient {
    pub fn new(categories: Vec<String>, days_lookback: u32) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::new()?,
            base_url: QUERY_URL.to_string(),
            categories,
            days_lookback: days_lookback.max(1),
            max_results: DEFAULT_MAX_RESULTS,
        })
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_base_url(mut self, base: &str) -> anyhow::Result<Self> {
        self.client.allow_url_host(base)?;
        self.base_url = base.trim_end_matches('/').to_string();
        Ok(self)
    }

    fn search_query(&self) -> String {
        self.categories
            .iter()
            .map(|c| format!("cat:{c}"))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

#[async_trait]
impl RecordSource for ArxivClient {
    fn name(&self) -> &str {
        "arxiv"
    }

    #[instrument(skip(self), fields(categories = self.categories.len()))]
    async fn fetch(&self) -> anyhow::Result<Vec<RawRecord>> {
        if self.categories.is_empty() {
            warn!("No arXiv categories configured");
            return Ok(Vec::new());
        }
        let params = [
            ("search_query", self.search_query()),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
            ("start", "0".to_string()),
            ("max_results", self.max_results.to_string()),
        ];

        let xml = self.client
            .get(&self.base_url)?
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let entries = parse_atom_feed(&xml);
        let cutoff = Utc::now() - Duration::days(i64::from(self.days_lookback));
        let total = entries.len();
        let recent: Vec<RawRecord> = entries
            .into_iter()
            .filter(|r| r.updated.or(r.published).map(|ts| ts >= cutoff).unwrap_or(true))
            .map(RawRecord::Arxiv)
            .collect();

        info!(entries = total, recent = recent.len(), days = self.days_lookback, "arXiv query complete");
        Ok(recent)
    }
}

// ── Atom XML ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    AuthorName,
    Doi,
    Comment,
    Published,
    Updated,
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim()).ok().map(|d| d.with_timezone(&Utc))
}

fn strip_abs_prefix(id: &str) -> String {
    ABS_PREFIXES
        .iter()
        .find_map(|p| id.strip_prefix(p))
        .unwrap_or(id)
        .to_string()
}

/// `<link>` and `<category>` carry their data in attributes and are usually
/// self-closing.
fn apply_attrs(record: &mut ArxivRecord, e: &BytesStart<'_>) {
    match e.local_name().as_ref() {
        b"link" => {
            let href = attr(e, b"href");
            if attr(e, b"title").as_deref() == Some("pdf") {
                record.pdf_url = href;
            } else if attr(e, b"rel").as_deref() == Some("alternate") {
                record.abs_url = href;
            }
        }
        b"category" => {
            if let Some(term) = attr(e, b"term") {
                if !record.categories.contains(&term) {
                    record.categories.push(term);
                }
            }
        }
        _ => {}
    }
}

/// Parse an arXiv Atom feed into records, in feed order. Malformed XML ends
/// parsing early; entries read so far are returned.
fn parse_atom_feed(xml: &str) -> Vec<ArxivRecord> {
    let mut records = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut current: Option<ArxivRecord> = None;
    let mut field = Field::None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"entry" {
                    current = Some(ArxivRecord::default());
                } else if let Some(record) = current.as_mut() {
                    field = match e.local_name().as_ref() {
                        b"id" => Field::Id,
                        b"title" => Field::Title,
                        b"summary" => Field::Summary,
                        b"name" => Field::AuthorName,
                        b"doi" => Field::Doi,
                        b"comment" => Field::Comment,
                        b"published" => Field::Published,
                        b"updated" => Field::Updated,
                        _ => {
                            apply_attrs(record, e);
                            Field::None
                        }
                    };
                    text.clear();
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(record) = current.as_mut() {
                    apply_attrs(record, e);
                }
            }
            Ok(Event::Text(ref e)) => {
                if field != Field::None {
                    text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(done) = current.take() {
                        debug!(id = ?done.id, "Parsed arXiv entry");
                        records.push(done);
                    }
                } else if let Some(record) = current.as_mut() {
                    let value = text.trim().to_string();
                    match field {
                        Field::Id => record.id = Some(strip_abs_prefix(&value)),
                        Field::Title => record.title = Some(value),
                        Field::Summary => record.summary = Some(value),
                        Field::AuthorName if !value.is_empty() => record.authors.push(value),
                        Field::Doi if !value.is_empty() => record.doi = Some(value),
                        Field::Comment if !value.is_empty() => record.comment = Some(value),
                        Field::Published => record.published = parse_timestamp(&value),
                        Field::Updated => record.updated = parse_timestamp(&value),
                        _ => {}
                    }
                }
                field = Field::None;
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("arXiv Atom parse error: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    records
}
