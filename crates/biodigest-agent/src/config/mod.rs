//! Configuration loading for biodigest.
//! Reads biodigest.toml from the current directory or the path in the
//! BIODIGEST_CONFIG env var. Every section has defaults, so a partial file
//! (or an empty one) is valid.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use biodigest_common::config::{default_buckets, validate_buckets};
use biodigest_common::{BucketDef, RulesConfig, SelectionConfig};
use biodigest_llm::{Provider, RetryPolicy};
use biodigest_ranker::ScoreWeights;

pub const DEFAULT_CONFIG_PATH: &str = "biodigest.toml";
pub const CONFIG_ENV_VAR: &str = "BIODIGEST_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    /// Ordered; the selector assigns each paper to the first listed bucket.
    #[serde(default = "default_buckets")]
    pub buckets: Vec<BucketDef>,
    #[serde(default)]
    pub scoring: ScoreWeights,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            rules: RulesConfig::default(),
            buckets: default_buckets(),
            scoring: ScoreWeights::default(),
            llm: LlmConfig::default(),
            sources: SourcesConfig::default(),
            ledger: LedgerConfig::default(),
            features: FeaturesConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

// ── [llm] ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Required for `openai_compatible`; optional override otherwise.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Classifier calls in flight at once.
    #[serde(default = "default_llm_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_llm_model()       -> String { "gemini-2.5-pro".to_string() }
fn default_llm_key_env()     -> String { "GEMINI_API_KEY".to_string() }
fn default_llm_timeout()     -> u64    { 120 }
fn default_llm_concurrency() -> usize  { 4 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_llm_model(),
            base_url: None,
            api_key_env: default_llm_key_env(),
            timeout_secs: default_llm_timeout(),
            concurrency: default_llm_concurrency(),
            retry: RetryPolicy::default(),
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.trim().is_empty())
    }
}

// ── [sources] ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Queried in this order; earlier sources win batch dedup ties.
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<String>,
    #[serde(default = "default_days_lookback")]
    pub days_lookback: u32,
    #[serde(default = "default_arxiv_categories")]
    pub arxiv_categories: Vec<String>,
    #[serde(default = "default_arxiv_max_results")]
    pub arxiv_max_results: usize,
    #[serde(default = "default_pubmed_queries")]
    pub pubmed_queries: Vec<String>,
    #[serde(default = "default_pubmed_key_env")]
    pub pubmed_api_key_env: String,
}

fn default_enabled_sources() -> Vec<String> {
    ["arxiv", "pubmed", "biorxiv", "medrxiv"].iter().map(|s| s.to_string()).collect()
}
fn default_days_lookback() -> u32 { 1 }
fn default_arxiv_categories() -> Vec<String> {
    ["q-bio.QM", "q-bio.NC", "q-bio.BM", "eess.IV", "cs.LG"].iter().map(|s| s.to_string()).collect()
}
fn default_arxiv_max_results() -> usize { 200 }
fn default_pubmed_queries() -> Vec<String> {
    [
        "(deep learning[tiab] OR machine learning[tiab]) AND (clinical[tiab] OR diagnosis[tiab])",
        "(artificial intelligence[tiab]) AND (drug discovery[tiab] OR protein structure[tiab])",
        "(brain-computer interface[tiab] OR neural decoding[tiab])",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_pubmed_key_env() -> String { "NCBI_API_KEY".to_string() }

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_sources(),
            days_lookback: default_days_lookback(),
            arxiv_categories: default_arxiv_categories(),
            arxiv_max_results: default_arxiv_max_results(),
            pubmed_queries: default_pubmed_queries(),
            pubmed_api_key_env: default_pubmed_key_env(),
        }
    }
}

impl SourcesConfig {
    pub fn pubmed_api_key(&self) -> Option<String> {
        std::env::var(&self.pubmed_api_key_env).ok().filter(|k| !k.trim().is_empty())
    }
}

pub const KNOWN_SOURCES: &[&str] = &["arxiv", "pubmed", "biorxiv", "medrxiv"];

// ── [ledger] / [features] / [output] ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

fn default_ledger_path() -> PathBuf { PathBuf::from("./data/ledger.json") }

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { path: default_ledger_path() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "bool_true")]
    pub include_digest_summary: bool,
    /// Look up a lead figure for arXiv papers.
    #[serde(default)]
    pub include_figures: bool,
    #[serde(default = "default_enrich_concurrency")]
    pub enrichment_concurrency: usize,
    /// Drop papers older than this many days. Papers without a date are kept.
    #[serde(default)]
    pub recent_days: Option<u32>,
}

fn bool_true() -> bool { true }
fn default_enrich_concurrency() -> usize { 4 }

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            include_digest_summary: true,
            include_figures: false,
            enrichment_concurrency: default_enrich_concurrency(),
            recent_days: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

fn default_output_dir() -> PathBuf { PathBuf::from("./output") }

impl Default for OutputConfig {
    fn default() -> Self {
        Self { directory: default_output_dir() }
    }
}


impl Config {
    /// Load configuration from `explicit`, else BIODIGEST_CONFIG, else
    /// biodigest.toml in the current directory.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        if !path.exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy biodigest.example.toml to biodigest.toml and edit it.",
                path.display()
            );
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.selection.validate()?;
        validate_buckets(&self.buckets)?;
        self.scoring.validate()?;

        if self.llm.concurrency == 0 {
            anyhow::bail!("llm.concurrency must be at least 1");
        }
        if self.llm.retry.max_attempts == 0 {
            anyhow::bail!("llm.retry.max_attempts must be at least 1");
        }
        if self.llm.provider == Provider::OpenAiCompatible && self.llm.base_url.is_none() {
            anyhow::bail!("llm.base_url is required for provider \"openai_compatible\"");
        }
        for name in &self.sources.enabled {
            if !KNOWN_SOURCES.contains(&name.as_str()) {
                anyhow::bail!("unknown source {name:?}; expected one of {KNOWN_SOURCES:?}");
            }
        }
        Ok(())
    }

    /// Bucket names in configured order.
    pub fn bucket_order(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.name.clone()).collect()
    }
}
