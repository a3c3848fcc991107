//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info, instrument, warn};

use biodigest_common::sandbox::SandboxClient as Client;

use crate::models::{AbstractSection, PubMedRecord, RawRecord};
use super::RecordSource;

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL:  &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
const DEFAULT_RETMAX: usize = 500;
/// NCBI recommends at most 200 ids per efetch request.
const EFETCH_BATCH: usize = 200;

pub struct PubMedClient {
    client: Client,
    api_key: Option<String>,
    queries: Vec<String>,
    days_lookback: u32,
    retmax: usize,
}

impl PubMedClient {
    pub fn new(api_key: Option<String>, queries: Vec<String>, days_lookback: u32) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::new()?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            queries,
            days_lookback: days_lookback.max(1),
            retmax: DEFAULT_RETMAX,
        })
    }

    fn dated_query(&self, query: &str, today: NaiveDate) -> String {
        let from = today - Duration::days(i64::from(self.days_lookback));
        format!(
            "{query} AND ({}:{}[PDAT])",
            from.format("%Y/%m/%d"),
            today.format("%Y/%m/%d")
        )
    }

    /// Search PubMed and return a list of PMIDs.
    #[instrument(skip(self))]
    async fn esearch(&self, term: &str) -> anyhow::Result<Vec<String>> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", term.to_string()),
            ("retmax", self.retmax.to_string()),
            ("retmode", "json".to_string()),
            ("sort", "pub_date".to_string()),
            ("usehistory", "n".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }

        let resp: serde_json::Value = self.client
            .get(ESEARCH_URL)?
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let ids: Vec<String> = resp["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| ids.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        debug!(count = ids.len(), "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    /// Fetch PubMed XML for a list of PMIDs and parse it.
    #[instrument(skip(self, pmids), fields(count = pmids.len()))]
    async fn efetch(&self, pmids: &[String]) -> anyhow::Result<Vec<PubMedRecord>> {
        let mut records = Vec::with_capacity(pmids.len());

        for batch in pmids.chunks(EFETCH_BATCH) {
            let mut params = vec![
                ("db", "pubmed".to_string()),
                ("id", batch.join(",")),
                ("retmode", "xml".to_string()),
            ];
            if let Some(key) = &self.api_key {
                params.push(("api_key", key.clone()));
            }

            let xml = self.client
                .get(EFETCH_URL)?
                .query(&params)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            let parsed = parse_pubmed_xml(&xml);
            debug!(requested = batch.len(), parsed = parsed.len(), "PubMed efetch batch");
            records.extend(parsed);
        }

        Ok(records)
    }
}

#[async_trait]
impl RecordSource for PubMedClient {
    fn name(&self) -> &str {
        "pubmed"
    }

    async fn fetch(&self) -> anyhow::Result<Vec<RawRecord>> {
        let today = Utc::now().date_naive();
        let mut pmids: Vec<String> = Vec::new();

        for query in &self.queries {
            for id in self.esearch(&self.dated_query(query, today)).await? {
                if !pmids.contains(&id) {
                    pmids.push(id);
                }
            }
        }

        info!(queries = self.queries.len(), pmids = pmids.len(), "PubMed search complete");
        let records = self.efetch(&pmids).await?;
        Ok(records.into_iter().map(RawRecord::PubMed).collect())
    }
}

// ── efetch XML ───────────────────────────────────────────────────────────────

/// Which text node the parser is currently collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Pmid,
    Title,
    Abstract,
    LastName,
    ForeName,
    Journal,
    Doi,
    Mesh,
    Year,
    Month,
    Day,
}

#[derive(Debug, Default)]
struct DateParts {
    year: String,
    month: String,
    day: String,
}

impl DateParts {
    fn to_date(&self) -> Option<NaiveDate> {
        let year = self.year.trim().parse::<i32>().ok()?;
        let month = parse_month(self.month.trim()).unwrap_or(1);
        let day = self.day.trim().parse::<u32>().unwrap_or(1);
        NaiveDate::from_ymd_opt(year, month, day)
            .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
    }
}

/// Numeric or abbreviated English month.
fn parse_month(m: &str) -> Option<u32> {
    if let Ok(n) = m.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const NAMES: [&str; 12] = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
    let lower = m.to_lowercase();
    NAMES.iter().position(|n| lower.starts_with(n)).map(|i| i as u32 + 1)
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Parse PubMed efetch XML (`<PubmedArticleSet><PubmedArticle>...`).
/// Malformed XML ends parsing early; articles read so far are returned.
fn parse_pubmed_xml(xml: &str) -> Vec<PubMedRecord> {
    let mut records = Vec::new();
    let mut reader = Reader::from_str(xml);

    let mut current: Option<PubMedRecord> = None;
    let mut capture = Capture::None;
    let mut text = String::new();

    let mut in_author = false;
    let mut in_journal = false;
    let mut last_name = String::new();
    let mut fore_name = String::new();
    let mut section_label: Option<String> = None;

    // PubStatus="pubmed" preferred, then "entrez", then the journal issue date.
    let mut date_kind: Option<u8> = None;
    let mut dates: [Option<NaiveDate>; 3] = [None, None, None];
    let mut parts = DateParts::default();

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let next = match e.name().as_ref() {
                    b"PubmedArticle" => {
                        current = Some(PubMedRecord::default());
                        dates = [None, None, None];
                        Capture::None
                    }
                    b"PMID" if current.as_ref().is_some_and(|r| r.pmid.is_none()) => Capture::Pmid,
                    b"ArticleTitle" => Capture::Title,
                    b"AbstractText" => {
                        section_label = attr(e, b"Label");
                        Capture::Abstract
                    }
                    b"Author" => {
                        in_author = true;
                        last_name.clear();
                        fore_name.clear();
                        Capture::None
                    }
                    b"LastName" if in_author => Capture::LastName,
                    b"ForeName" if in_author => Capture::ForeName,
                    b"Journal" => { in_journal = true; Capture::None }
                    b"Title" if in_journal => Capture::Journal,
                    b"ArticleId" if attr(e, b"IdType").as_deref() == Some("doi") => Capture::Doi,
                    b"DescriptorName" => Capture::Mesh,
                    b"PubMedPubDate" => {
                        date_kind = match attr(e, b"PubStatus").as_deref() {
                            Some("pubmed") => Some(0),
                            Some("entrez") => Some(1),
                            _ => None,
                        };
                        parts = DateParts::default();
                        Capture::None
                    }
                    b"PubDate" if in_journal => {
                        date_kind = Some(2);
                        parts = DateParts::default();
                        Capture::None
                    }
                    b"Year" if date_kind.is_some() => Capture::Year,
                    b"Month" if date_kind.is_some() => Capture::Month,
                    b"Day" if date_kind.is_some() => Capture::Day,
                    // Inline markup (<i>, <sup>, ...) keeps collecting into the open field.
                    _ => capture,
                };
                if next != capture {
                    text.clear();
                }
                capture = next;
            }
            Ok(Event::Text(ref e)) => {
                if capture != Capture::None {
                    text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::CData(ref e)) => {
                if capture != Capture::None {
                    text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) => {
                let Some(record) = current.as_mut() else {
                    buf.clear();
                    continue;
                };
                let value = text.trim().to_string();
                match e.name().as_ref() {
                    b"PMID" if capture == Capture::Pmid => record.pmid = Some(value),
                    b"ArticleTitle" => record.title = Some(value),
                    b"AbstractText" => {
                        if !value.is_empty() {
                            record.abstract_sections.push(AbstractSection {
                                label: section_label.take(),
                                text: value,
                            });
                        }
                    }
                    b"LastName" if in_author => last_name = value,
                    b"ForeName" if in_author => fore_name = value,
                    b"Author" => {
                        if !last_name.is_empty() {
                            let name = if fore_name.is_empty() {
                                last_name.clone()
                            } else {
                                format!("{fore_name} {last_name}")
                            };
                            record.authors.push(name);
                        }
                        in_author = false;
                    }
                    b"Title" if in_journal => record.journal = Some(value),
                    b"Journal" => in_journal = false,
                    b"ArticleId" if capture == Capture::Doi => {
                        if record.doi.is_none() && !value.is_empty() {
                            record.doi = Some(value);
                        }
                    }
                    b"DescriptorName" => {
                        if !value.is_empty() {
                            record.mesh_terms.push(value);
                        }
                    }
                    b"Year" if capture == Capture::Year => parts.year = value,
                    b"Month" if capture == Capture::Month => parts.month = value,
                    b"Day" if capture == Capture::Day => parts.day = value,
                    b"PubMedPubDate" | b"PubDate" => {
                        if let Some(kind) = date_kind.take() {
                            let slot = &mut dates[usize::from(kind)];
                            if slot.is_none() {
                                *slot = parts.to_date();
                            }
                        }
                    }
                    b"PubmedArticle" => {
                        if let Some(mut done) = current.take() {
                            done.published = dates.iter().flatten().next().copied();
                            if done.title.as_deref().map(str::is_empty).unwrap_or(true) {
                                warn!(pmid = ?done.pmid, "PubMed article without title");
                            }
                            records.push(done);
                        }
                        buf.clear();
                        continue;
                    }
                    _ => {
                        buf.clear();
                        continue;
                    }
                }
                capture = Capture::None;
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("PubMed XML parse error: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">39012345</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><Year>2024</Year><Month>Dec</Month></PubDate></JournalIssue>
          <Title>Nature Medicine</Title>
        </Journal>
        <ArticleTitle>Deep learning for <i>early</i> sepsis detection</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Sepsis &amp; mortality.</AbstractText>
          <AbstractText Label="METHODS">We trained a transformer.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author><LastName>Smith</LastName><ForeName>John</ForeName></Author>
          <Author><CollectiveName>Sepsis Consortium</CollectiveName></Author>
          <Author><LastName>Lee</LastName></Author>
        </AuthorList>
      </Article>
      <MeshHeadingList>
        <MeshHeading><DescriptorName UI="D018805">Sepsis</DescriptorName></MeshHeading>
        <MeshHeading><DescriptorName UI="D000077321">Deep Learning</DescriptorName></MeshHeading>
      </MeshHeadingList>
      <CommentsCorrectionsList>
        <CommentsCorrections><PMID>11111111</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
    <PubmedData>
      <History>
        <PubMedPubDate PubStatus="received"><Year>2024</Year><Month>5</Month><Day>1</Day></PubMedPubDate>
        <PubMedPubDate PubStatus="pubmed"><Year>2025</Year><Month>1</Month><Day>15</Day></PubMedPubDate>
      </History>
      <ArticleIdList>
        <ArticleId IdType="pubmed">39012345</ArticleId>
        <ArticleId IdType="doi">10.1038/s41591-025-00001-x</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>39000002</PMID>
      <Article>
        <Journal><JournalIssue><PubDate><Year>2025</Year><Month>Feb</Month></PubDate></JournalIssue></Journal>
        <ArticleTitle>Second</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_full_article() {
        let records = parse_pubmed_xml(SAMPLE);
        assert_eq!(records.len(), 2);

        let r = &records[0];
        assert_eq!(r.pmid.as_deref(), Some("39012345"));
        assert_eq!(r.title.as_deref(), Some("Deep learning for early sepsis detection"));
        assert_eq!(r.doi.as_deref(), Some("10.1038/s41591-025-00001-x"));
        assert_eq!(r.journal.as_deref(), Some("Nature Medicine"));
        assert_eq!(r.authors, vec!["John Smith".to_string(), "Lee".to_string()]);
        assert_eq!(r.abstract_sections.len(), 2);
        assert_eq!(r.abstract_sections[0].label.as_deref(), Some("BACKGROUND"));
        assert_eq!(r.abstract_sections[0].text, "Sepsis & mortality.");
        assert_eq!(r.mesh_terms, vec!["Sepsis".to_string(), "Deep Learning".to_string()]);
        assert_eq!(r.published, NaiveDate::from_ymd_opt(2025, 1, 15));
    }

    #[test]
    fn test_journal_date_fallback() {
        let records = parse_pubmed_xml(SAMPLE);
        assert_eq!(records[1].pmid.as_deref(), Some("39000002"));
        assert_eq!(records[1].published, NaiveDate::from_ymd_opt(2025, 2, 1));
        assert!(records[1].doi.is_none());
    }

    #[test]
    fn test_truncated_xml_keeps_complete_articles() {
        let cut = &SAMPLE[..SAMPLE.find("<PMID>39000002").unwrap_or(SAMPLE.len())];
        let records = parse_pubmed_xml(cut);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_dated_query() {
        let c = PubMedClient::new(None, vec!["machine learning".into()], 2).unwrap();
        let q = c.dated_query("machine learning", NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
        assert_eq!(q, "machine learning AND (2025/01/01:2025/01/03[PDAT])");
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("Dec"), Some(12));
        assert_eq!(parse_month("7"), Some(7));
        assert_eq!(parse_month("13"), None);
        assert_eq!(parse_month(""), None);
    }
}
