//! biodigest — daily biomedical AI paper digest.
//! Entry point for the agent binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use biodigest_agent::config::Config;
use biodigest_agent::output::JsonFileSink;
use biodigest_agent::pipeline::{Collaborators, DigestPipeline, RunOptions, RunOutcome};
use biodigest_db::{HistoryLedger, JsonFileLedger};
use biodigest_ingestion::enrichment::{Ar5ivFigureEnricher, Enricher, Enrichers};
use biodigest_ingestion::sources::{ArxivClient, BioRxivClient, PubMedClient, RecordSource};
use biodigest_llm::{build_backend, DigestSummarizer, LlmBackend, LlmClassifier, PaperClassifier};

#[derive(Debug, Parser)]
#[command(name = "biodigest", version, about = "Fetch, screen, rank and digest new biomedical AI papers")]
struct Cli {
    /// Dry run: write the digest but leave the ledger untouched.
    #[arg(long = "test")]
    test_mode: bool,

    /// Skip the LLM classifier and keep every screened paper.
    #[arg(long = "skip-classify")]
    skip_classification: bool,

    /// Reprocess papers the ledger has already seen.
    #[arg(long)]
    force: bool,

    /// Delete the ledger file before running.
    #[arg(long)]
    reset_db: bool,

    /// Debug-level logging for biodigest crates.
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to $BIODIGEST_CONFIG, then ./biodigest.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn build_sources(config: &Config) -> anyhow::Result<Vec<Box<dyn RecordSource>>> {
    let s = &config.sources;
    let mut sources: Vec<Box<dyn RecordSource>> = Vec::new();
    for name in &s.enabled {
        match name.as_str() {
            "arxiv" => sources.push(Box::new(
                ArxivClient::new(s.arxiv_categories.clone(), s.days_lookback)?.with_max_results(s.arxiv_max_results),
            )),
            "pubmed" => sources.push(Box::new(PubMedClient::new(
                s.pubmed_api_key(),
                s.pubmed_queries.clone(),
                s.days_lookback,
            )?)),
            "biorxiv" => sources.push(Box::new(BioRxivClient::new_biorxiv(s.days_lookback)?)),
            "medrxiv" => sources.push(Box::new(BioRxivClient::new_medrxiv(s.days_lookback)?)),
            other => anyhow::bail!("unknown source {other:?}"),
        }
    }
    Ok(sources)
}

fn build_llm(config: &Config) -> anyhow::Result<Arc<dyn LlmBackend>> {
    let llm = &config.llm;
    let backend = build_backend(
        llm.provider,
        &llm.model,
        llm.base_url.as_deref(),
        llm.api_key(),
        Duration::from_secs(llm.timeout_secs),
    )
    .with_context(|| format!("building {:?} backend (API key from ${})", llm.provider, llm.api_key_env))?;
    Ok(backend)
}

fn build_enrichers(config: &Config) -> anyhow::Result<Enrichers> {
    let figure: Option<Arc<dyn Enricher>> = if config.features.include_figures {
        Some(Arc::new(Ar5ivFigureEnricher::new()?))
    } else {
        None
    };
    Ok(Enrichers {
        figure,
        social: None,
        concurrency: config.features.enrichment_concurrency,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Secrets may live in .env; a missing file is fine.
    let _ = dotenvy::dotenv();

    let default_filter = if cli.verbose { "biodigest=debug,info" } else { "biodigest=info,warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("biodigest {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(cli.config.as_deref())?;
    info!(
        sources = ?config.sources.enabled,
        buckets = config.buckets.len(),
        provider = ?config.llm.provider,
        model = %config.llm.model,
        "Configuration loaded"
    );

    if cli.reset_db {
        warn!(path = %config.ledger.path.display(), "Resetting ledger");
        JsonFileLedger::reset(&config.ledger.path).await?;
    }
    let ledger: Arc<dyn HistoryLedger> = Arc::new(JsonFileLedger::open(&config.ledger.path).await?);

    // Classification needs a backend; a skip run only uses one for the summary.
    let backend = match build_llm(&config) {
        Ok(b) => Some(b),
        Err(e) if cli.skip_classification => {
            warn!(error = %format!("{e:#}"), "No LLM backend; continuing without a digest summary");
            None
        }
        Err(e) => return Err(e),
    };
    let classifier: Option<Arc<dyn PaperClassifier>> = match (&backend, cli.skip_classification) {
        (Some(b), false) => Some(Arc::new(LlmClassifier::new(b.clone(), &config.buckets))),
        _ => None,
    };
    let summarizer = match &backend {
        Some(b) if config.features.include_digest_summary => {
            Some(DigestSummarizer::new(b.clone(), config.llm.retry.clone()))
        }
        _ => None,
    };

    let collab = Collaborators {
        sources: build_sources(&config)?,
        ledger,
        classifier,
        summarizer,
        enrichers: build_enrichers(&config)?,
        sink: Box::new(JsonFileSink::new(config.output.directory.clone())),
    };
    let pipeline = DigestPipeline::new(&config, collab)?;

    let report = pipeline
        .run(RunOptions {
            test_mode: cli.test_mode,
            skip_classification: cli.skip_classification,
            force: cli.force,
        })
        .await?;

    for failure in &report.source_failures {
        warn!(%failure, "Source failed during run");
    }
    match report.outcome {
        RunOutcome::Produced => info!(
            location = report.location.as_deref().unwrap_or(""),
            headline = report.summary.as_ref().map(|s| s.headline.as_str()).unwrap_or(""),
            "Digest ready"
        ),
        outcome => info!(?outcome, "No digest produced"),
    }
    Ok(())
}
