//! Figure and social-post enrichment.
//!
//! Enrichers are optional collaborators. A lookup failure is logged and the
//! field is left empty; it never removes a paper from the run.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use biodigest_common::{sandbox::SandboxClient, Enrichment, Paper, SourceKind};

/// Looks up one optional reference URL for a paper.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, paper: &Paper) -> Result<Option<String>>;
}

/// The configured enrichers. Either slot may be empty.
#[derive(Clone, Default)]
pub struct Enrichers {
    pub figure: Option<Arc<dyn Enricher>>,
    pub social: Option<Arc<dyn Enricher>>,
    pub concurrency: usize,
}

impl Enrichers {
    pub fn is_empty(&self) -> bool {
        self.figure.is_none() && self.social.is_none()
    }

    /// Enrich every paper, preserving input order.
    pub async fn enrich(&self, papers: Vec<Paper>) -> Vec<Paper> {
        if self.is_empty() {
            return papers;
        }
        stream::iter(papers)
            .map(|paper| async move {
                let enrichment = Enrichment {
                    figure_url: lookup_or_none(self.figure.as_deref(), &paper).await,
                    social_url: lookup_or_none(self.social.as_deref(), &paper).await,
                };
                paper.with_enrichment(enrichment)
            })
            .buffered(self.concurrency.max(1))
            .collect()
            .await
    }
}

async fn lookup_or_none(enricher: Option<&dyn Enricher>, paper: &Paper) -> Option<String> {
    let enricher = enricher?;
    match enricher.lookup(paper).await {
        Ok(found) => {
            debug!(enricher = enricher.name(), canonical_id = %paper.canonical_id, found = found.is_some(), "Enrichment lookup");
            found
        }
        Err(e) => {
            warn!(enricher = enricher.name(), canonical_id = %paper.canonical_id, error = %e, "Enrichment failed");
            None
        }
    }
}

// ── ar5iv figures ────────────────────────────────────────────────────────────

static FIGURE_IMG: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"(?s)<figure[^>]*class="[^"]*ltx_figure[^"]*"[^>]*>.*?<img[^>]*src="([^"]+)""#).ok()
});

/// First figure image from the ar5iv HTML rendering of an arXiv paper.
pub struct Ar5ivFigureEnricher {
    client: SandboxClient,
    base_url: String,
}

impl Ar5ivFigureEnricher {
    pub fn new() -> Result<Self> {
        let mut client = SandboxClient::new()?;
        client.allow_domain("ar5iv.org");
        client.allow_domain("ar5iv.labs.arxiv.org");
        Ok(Self { client, base_url: "https://ar5iv.org".to_string() })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Result<Self> {
        self.base_url = base_url.into();
        self.client.allow_url_host(&self.base_url)?;
        Ok(self)
    }
}

#[async_trait]
impl Enricher for Ar5ivFigureEnricher {
    fn name(&self) -> &str {
        "ar5iv-figure"
    }

    async fn lookup(&self, paper: &Paper) -> Result<Option<String>> {
        let Some(arxiv_id) = arxiv_id_for(paper) else {
            return Ok(None);
        };
        let page = format!("{}/html/{arxiv_id}/", self.base_url.trim_end_matches('/'));
        let resp = self.client.get(&page)?.send().await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let html = resp.text().await?;
        Ok(first_figure_src(&html).map(|src| resolve_src(&page, &src)))
    }
}

/// arXiv id from the canonical id, else from an arXiv paper's abstract page
/// (arXiv records that carry a DOI are keyed by the DOI).
fn arxiv_id_for(paper: &Paper) -> Option<String> {
    if let Some(id) = paper.canonical_id.strip_prefix("arxiv:") {
        return Some(id.to_string());
    }
    if paper.source != SourceKind::Arxiv {
        return None;
    }
    let (_, rest) = paper.links.page.as_deref()?.split_once("arxiv.org/abs/")?;
    let id = rest.trim_end_matches('/');
    (!id.is_empty()).then(|| id.to_string())
}

fn first_figure_src(html: &str) -> Option<String> {
    FIGURE_IMG
        .as_ref()?
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn resolve_src(page: &str, src: &str) -> String {
    if src.starts_with("http://") || src.starts_with("https://") {
        return src.to_string();
    }
    match url::Url::parse(page).and_then(|base| base.join(src)) {
        Ok(u) => u.to_string(),
        Err(_) => src.to_string(),
    }
}
