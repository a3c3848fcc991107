//! Paper classification through an LLM backend.
//!
//! The classifier sees one paper at a time and returns a structured
//! verdict. Transport failures are `Transient` and worth retrying; a reply
//! that cannot be turned into a verdict is `Malformed` and goes straight to
//! the fallback.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use biodigest_common::{BucketDef, ClassifierVerdict, Paper};

use crate::backend::{LlmBackend, LlmError, LlmRequest, Message};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("transient classifier failure: {0}")]
    Transient(String),
    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

impl ClassifyError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClassifyError::Transient(_))
    }
}

impl From<LlmError> for ClassifyError {
    fn from(e: LlmError) -> Self {
        if e.is_transient() {
            ClassifyError::Transient(e.to_string())
        } else {
            ClassifyError::Malformed(e.to_string())
        }
    }
}

#[async_trait]
pub trait PaperClassifier: Send + Sync {
    async fn classify(&self, paper: &Paper) -> Result<ClassifierVerdict, ClassifyError>;
}

// ── Prompt ────────────────────────────────────────────────────────────────────

const RISK_FLAGS: &[(&str, &str)] = &[
    ("in-vitro-only", "No validation beyond lab experiments"),
    ("no-validation", "Purely theoretical or simulated"),
    ("sim-only", "Results only on simulated or synthetic data"),
    ("small-sample", "Very limited dataset (n < 50)"),
    ("no-code", "No code repository mentioned"),
    ("animal-only", "No clear human translation path"),
    ("narrow-domain", "Very specific niche application"),
];

fn build_system_prompt(buckets: &[BucketDef]) -> String {
    let bucket_lines = buckets
        .iter()
        .map(|b| format!("- {}: {}", b.name, b.keywords.join(", ")))
        .collect::<Vec<_>>()
        .join("\n");
    let flag_lines = RISK_FLAGS
        .iter()
        .map(|(flag, desc)| format!("- \"{flag}\": {desc}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a biomedical AI research analyst focused on AI for medicine, healthcare, \
biotechnology, neurotech and drug discovery. Evaluate each paper for relevance and \
classify it into the buckets below.

BUCKETS FOR CLASSIFICATION:
{bucket_lines}

RELEVANCE SCALE (be selective, most papers score below 60):
- 80-100: direct clinical impact or major breakthrough, validated on real patient data
- 60-79: strong potential for clinical translation
- 40-59: interesting AI methods for biomedical problems, early-stage work, datasets or benchmarks
- 20-39: tangentially related, basic ML without a clear medical application
- 0-19: outside scope

Set keep=true only for papers with relevance_score >= 40. Drop pure statistics without \
modern ML, pure chemistry or biology without a computational component, theoretical work \
without validation, and animal-only work without a human translation path.

RISK FLAGS to identify:
{flag_lines}

For papers scoring 80 or more write a 3-4 sentence summary covering the clinical problem, \
the method and the key results. Otherwise keep the summary to 1-2 sentences.

Extract any GitHub, GitLab, project page or dataset URLs from the abstract and comments.

Respond with a single JSON object:
{{\"keep\": bool, \"relevance_score\": number 0-100, \"buckets\": [string], \
\"risk_flags\": [string], \"why_it_matters\": string, \"summary\": string, \
\"code_urls\": [string], \"dataset_urls\": [string]}}"
    )
}

fn build_paper_prompt(paper: &Paper) -> String {
    let categories = paper.categories.iter().cloned().collect::<Vec<_>>().join(", ");
    let mut prompt = format!(
        "Title: {}\nCategories: {}\nAbstract: {}\n",
        paper.title, categories, paper.abstract_text
    );
    if !paper.comments.is_empty() {
        prompt.push_str(&format!("Comments: {}\n", paper.comments));
    }
    let links: Vec<&str> = paper
        .links
        .code
        .iter()
        .chain(paper.links.datasets.iter())
        .map(String::as_str)
        .collect();
    if !links.is_empty() {
        prompt.push_str(&format!("Links: {}\n", links.join(", ")));
    }
    if !paper.heuristic.detected_buckets.is_empty() {
        prompt.push_str(&format!(
            "Heuristic bucket hints: {}\n",
            paper.heuristic.detected_buckets.join(", ")
        ));
    }
    prompt
}

// ── Response parsing ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawVerdict {
    keep: Option<bool>,
    relevance_score: Option<f64>,
    #[serde(default)]
    buckets: Vec<String>,
    #[serde(default)]
    risk_flags: Vec<String>,
    #[serde(default)]
    why_it_matters: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    code_urls: Vec<String>,
    #[serde(default)]
    dataset_urls: Vec<String>,
}

/// Models sometimes wrap JSON in a markdown fence despite JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn non_blank(items: Vec<String>) -> BTreeSet<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Turn a model reply into a verdict. `keep` and `relevance_score` are
/// required; the score is clamped to [0, 100].
pub fn parse_verdict(text: &str) -> Result<ClassifierVerdict, ClassifyError> {
    let raw: RawVerdict = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| ClassifyError::Malformed(format!("invalid JSON: {e}")))?;

    let keep = raw.keep.ok_or_else(|| ClassifyError::Malformed("missing `keep`".into()))?;
    let score = raw
        .relevance_score
        .ok_or_else(|| ClassifyError::Malformed("missing `relevance_score`".into()))?;
    if !score.is_finite() {
        return Err(ClassifyError::Malformed(format!("non-finite relevance_score {score}")));
    }

    Ok(ClassifierVerdict {
        keep,
        relevance_score: score.clamp(0.0, 100.0),
        buckets: non_blank(raw.buckets),
        risk_flags: non_blank(raw.risk_flags),
        why_it_matters: raw.why_it_matters,
        summary: raw.summary,
        code_urls: non_blank(raw.code_urls),
        dataset_urls: non_blank(raw.dataset_urls),
        error: None,
    })
}

// ── LlmClassifier ─────────────────────────────────────────────────────────────

pub struct LlmClassifier {
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClassifier {
    pub fn new(backend: Arc<dyn LlmBackend>, buckets: &[BucketDef]) -> Self {
        Self {
            backend,
            system_prompt: build_system_prompt(buckets),
            temperature: 0.3,
            max_tokens: 2048,
        }
    }
}

#[async_trait]
impl PaperClassifier for LlmClassifier {
    async fn classify(&self, paper: &Paper) -> Result<ClassifierVerdict, ClassifyError> {
        let req = LlmRequest {
            messages: vec![
                Message::system(self.system_prompt.clone()),
                Message::user(build_paper_prompt(paper)),
            ],
            model: None,
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            json_mode: true,
        };
        let resp = self.backend.complete(req).await?;
        let verdict = parse_verdict(&resp.content)?;
        debug!(
            canonical_id = %paper.canonical_id,
            keep = verdict.keep,
            relevance = verdict.relevance_score,
            buckets = ?verdict.buckets,
            risk_flags = ?verdict.risk_flags,
            "Classified"
        );
        Ok(verdict)
    }
}

/// Verdict used when classification is skipped: everything is kept at a
/// neutral score, with the heuristic buckets standing in for the model's.
pub fn debug_verdict(paper: &Paper) -> ClassifierVerdict {
    let summary: String = paper.abstract_text.chars().take(200).collect();
    ClassifierVerdict {
        keep: true,
        relevance_score: 50.0,
        buckets: paper.heuristic.detected_buckets.iter().cloned().collect(),
        why_it_matters: "Debug mode - all papers included".to_string(),
        summary: format!("{summary}..."),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LlmResponse;
    use biodigest_common::{default_buckets, SourceKind};
    use std::sync::Mutex;

    struct ScriptedBackend {
        reply: Result<String, u16>,
        seen: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(req);
            }
            match &self.reply {
                Ok(content) => Ok(LlmResponse {
                    content: content.clone(),
                    model: "scripted".into(),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                }),
                Err(status) => Err(LlmError::ApiError { status: *status, message: "boom".into() }),
            }
        }
        fn model_id(&self) -> &str { "scripted" }
        fn is_local(&self) -> bool { true }
    }

    fn paper() -> Paper {
        let mut p = Paper::new("arxiv:2501.00001", SourceKind::Arxiv, "Deep learning for MRI");
        p.abstract_text = "We segment tumours.".into();
        p.categories.insert("cs.CV".into());
        p.comments = "Code at https://github.com/x/y".into();
        p.heuristic.detected_buckets = vec!["Medical Imaging".into()];
        p
    }

    #[test]
    fn test_parse_verdict_clamps_and_sets() {
        let v = parse_verdict(
            r#"{"keep": true, "relevance_score": 140, "buckets": ["Medical Imaging", " "],
                "risk_flags": ["no-code"], "code_urls": ["https://github.com/x/y"]}"#,
        )
        .unwrap();
        assert!(v.keep);
        assert_eq!(v.relevance_score, 100.0);
        assert_eq!(v.buckets.len(), 1);
        assert!(v.risk_flags.contains("no-code"));
        assert!(v.error.is_none());

        let v = parse_verdict(r#"{"keep": false, "relevance_score": -3}"#).unwrap();
        assert_eq!(v.relevance_score, 0.0);
    }

    #[test]
    fn test_parse_verdict_strips_fence() {
        let v = parse_verdict("```json\n{\"keep\": true, \"relevance_score\": 72}\n```").unwrap();
        assert_eq!(v.relevance_score, 72.0);
    }

    #[test]
    fn test_parse_verdict_malformed() {
        assert!(matches!(parse_verdict("not json"), Err(ClassifyError::Malformed(_))));
        assert!(matches!(parse_verdict(r#"{"relevance_score": 50}"#), Err(ClassifyError::Malformed(_))));
        assert!(matches!(parse_verdict(r#"{"keep": true}"#), Err(ClassifyError::Malformed(_))));
    }

    #[test]
    fn test_prompts() {
        let system = build_system_prompt(&default_buckets());
        assert!(system.contains("- Medical Imaging: radiology, MRI"));
        assert!(system.contains("\"no-code\""));

        let prompt = build_paper_prompt(&paper());
        assert!(prompt.starts_with("Title: Deep learning for MRI\n"));
        assert!(prompt.contains("Categories: cs.CV"));
        assert!(prompt.contains("Comments: Code at"));
        assert!(prompt.contains("Heuristic bucket hints: Medical Imaging"));
    }

    #[tokio::test]
    async fn test_classifier_uses_json_mode() {
        let backend = Arc::new(ScriptedBackend {
            reply: Ok(r#"{"keep": true, "relevance_score": 81, "buckets": ["Medical Imaging"]}"#.into()),
            seen: Mutex::new(Vec::new()),
        });
        let clf = LlmClassifier::new(backend.clone(), &default_buckets());
        let v = clf.classify(&paper()).await.unwrap();
        assert_eq!(v.relevance_score, 81.0);

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].json_mode);
        assert_eq!(seen[0].messages[0].role, "system");
    }

    #[tokio::test]
    async fn test_error_kinds() {
        let transient = LlmClassifier::new(
            Arc::new(ScriptedBackend { reply: Err(503), seen: Mutex::new(Vec::new()) }),
            &default_buckets(),
        );
        assert!(transient.classify(&paper()).await.unwrap_err().is_retryable());

        let client_err = LlmClassifier::new(
            Arc::new(ScriptedBackend { reply: Err(400), seen: Mutex::new(Vec::new()) }),
            &default_buckets(),
        );
        assert!(!client_err.classify(&paper()).await.unwrap_err().is_retryable());
    }

    #[test]
    fn test_debug_verdict() {
        let mut p = paper();
        p.abstract_text = "a".repeat(300);
        let v = debug_verdict(&p);
        assert!(v.keep);
        assert_eq!(v.relevance_score, 50.0);
        assert!(v.buckets.contains("Medical Imaging"));
        assert_eq!(v.summary.chars().count(), 203);
        assert_eq!(v.why_it_matters, "Debug mode - all papers included");
    }
}
