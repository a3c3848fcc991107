//! Digest-level summary: a headline plus a few bullets over the kept papers.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use biodigest_common::Paper;

use crate::backend::{LlmBackend, LlmError, LlmRequest, Message};
use crate::retry::RetryPolicy;

const MAX_HEADLINE_CHARS: usize = 100;
const MAX_PROMPT_PAPERS_CHARS: usize = 15_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigestSummary {
    pub headline: String,
    pub bullets: Vec<String>,
    pub highlights: Vec<String>,
    /// True when built from counts after the model call failed.
    #[serde(default)]
    pub fallback: bool,
}

impl DigestSummary {
    pub fn empty() -> Self {
        Self { headline: "No relevant papers today".to_string(), ..Default::default() }
    }

    /// Count-based summary used when the model is unavailable.
    pub fn from_counts(papers: &[Paper]) -> Self {
        let categories: BTreeSet<&String> = papers
            .iter()
            .filter_map(|p| p.verdict.as_ref())
            .flat_map(|v| v.buckets.iter())
            .collect();
        let top = papers.iter().map(|p| p.final_score).fold(0.0_f64, f64::max);
        Self {
            headline: format!("Today's digest: {} papers on biomedical AI & healthcare", papers.len()),
            bullets: vec![
                format!("Found {} relevant papers across {} categories", papers.len(), categories.len()),
                format!("Top paper scored {top:.0}/100"),
            ],
            highlights: Vec::new(),
            fallback: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct PaperBrief<'a> {
    title: &'a str,
    score: f64,
    buckets: Vec<&'a str>,
    why_matters: &'a str,
    summary: &'a str,
    has_code: bool,
    has_dataset: bool,
}

impl<'a> PaperBrief<'a> {
    fn from_paper(p: &'a Paper) -> Self {
        let (buckets, why, summary) = match &p.verdict {
            Some(v) => (
                v.buckets.iter().map(String::as_str).collect(),
                v.why_it_matters.as_str(),
                v.summary.as_str(),
            ),
            None => (Vec::new(), "", ""),
        };
        Self {
            title: &p.title,
            score: p.final_score,
            buckets,
            why_matters: why,
            summary,
            has_code: !p.links.code.is_empty(),
            has_dataset: !p.links.datasets.is_empty(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSummary {
    headline: Option<String>,
    #[serde(default)]
    bullets: Vec<String>,
    #[serde(default)]
    highlights: Vec<String>,
}

fn truncate_headline(headline: String) -> String {
    if headline.chars().count() <= MAX_HEADLINE_CHARS {
        return headline;
    }
    let cut: String = headline.chars().take(MAX_HEADLINE_CHARS - 3).collect();
    format!("{cut}...")
}

fn build_prompt(papers: &[Paper]) -> Result<String, LlmError> {
    let briefs: Vec<PaperBrief<'_>> = papers.iter().map(PaperBrief::from_paper).collect();
    let json = serde_json::to_string_pretty(&briefs)?;
    let json: String = json.chars().take(MAX_PROMPT_PAPERS_CHARS).collect();
    Ok(format!(
        "Create a concise digest summary of today's research papers for researchers and clinicians.

Focus on clinical breakthroughs and patient impact, novel AI/ML methods for healthcare, \
drug discovery and biotech innovation, neuroscience and brain-computer interface advances, \
and any datasets or code releases.

Papers to summarize:
{json}

Output JSON with this structure:
{{\"headline\": \"one-line summary of today's key theme (max 100 chars)\", \
\"bullets\": [\"3-6 actionable bullet points\"], \
\"highlights\": [\"0-3 notable results, datasets or clinical applications\"]}}"
    ))
}

/// Parse a model reply, filling the gaps the model left.
pub fn parse_summary(text: &str, paper_count: usize) -> Result<DigestSummary, LlmError> {
    let raw: RawSummary = serde_json::from_str(text.trim())?;
    let headline = raw
        .headline
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| format!("{paper_count} papers on biomedical AI & healthcare"));
    let bullets = if raw.bullets.is_empty() {
        vec![format!("Found {paper_count} relevant papers today")]
    } else {
        raw.bullets
    };
    Ok(DigestSummary {
        headline: truncate_headline(headline),
        bullets,
        highlights: raw.highlights,
        fallback: false,
    })
}

pub struct DigestSummarizer {
    backend: Arc<dyn LlmBackend>,
    policy: RetryPolicy,
}

impl DigestSummarizer {
    pub fn new(backend: Arc<dyn LlmBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    async fn request(&self, prompt: &str, paper_count: usize) -> Result<DigestSummary, LlmError> {
        let req = LlmRequest {
            messages: vec![
                Message::system(
                    "You are a biomedical AI research analyst focused on neurotech, biotech startups and clinical AI innovation.",
                ),
                Message::user(prompt),
            ],
            model: None,
            max_tokens: Some(2048),
            temperature: Some(0.3),
            json_mode: true,
        };
        let resp = self.backend.complete(req).await?;
        parse_summary(&resp.content, paper_count)
    }

    /// Never fails: any error yields the count-based summary.
    pub async fn summarize(&self, papers: &[Paper]) -> DigestSummary {
        if papers.is_empty() {
            return DigestSummary::empty();
        }
        let prompt = match build_prompt(papers) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Failed to build summary prompt");
                return DigestSummary::from_counts(papers);
            }
        };
        let result = self
            .policy
            .run("digest-summary", || self.request(&prompt, papers.len()), LlmError::is_transient)
            .await;
        match result {
            Ok(summary) => {
                info!(headline = %summary.headline, "Generated digest summary");
                summary
            }
            Err(e) => {
                warn!(error = %e, "Failed to generate summary, using counts");
                DigestSummary::from_counts(papers)
            }
        }
    }
}
