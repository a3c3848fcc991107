use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;
use url::Url;
use crate::error::DigestError;

/// Hosts every digest run needs: the literature APIs and the default LLM endpoints.
const DEFAULT_ALLOWLIST: &[&str] = &[
    "eutils.ncbi.nlm.nih.gov",            // PubMed
    "api.biorxiv.org",                    // bioRxiv / medRxiv
    "export.arxiv.org",                   // arXiv
    "generativelanguage.googleapis.com",  // Gemini
    "api.openai.com",                     // OpenAI-compatible
    "localhost",                          // Ollama local
    "127.0.0.1",
];

/// An HTTP client that only talks to approved hosts.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default allowlist and a 30 s timeout.
    pub fn new() -> Result<Self, DigestError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DigestError> {
        let allowlist = DEFAULT_ALLOWLIST.iter().map(|d| d.to_string()).collect();

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("biodigest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DigestError::Pipeline(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Allows the host of `url`, e.g. a configured self-hosted LLM endpoint.
    pub fn allow_url_host(&mut self, url: &str) -> Result<(), DigestError> {
        let parsed = Url::parse(url)
            .map_err(|e| DigestError::Config(format!("invalid URL {url}: {e}")))?;
        match parsed.host_str() {
            Some(host) => {
                self.allow_domain(host);
                Ok(())
            }
            None => Err(DigestError::Config(format!("URL has no host: {url}"))),
        }
    }

    /// Exact match or subdomain of an allowed host.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, DigestError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, DigestError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }

    fn check(&self, url: &str) -> Result<(), DigestError> {
        if !self.is_allowed(url) {
            warn!(%url, "Blocked request to host outside the allowlist");
            return Err(DigestError::SecurityError(format!(
                "Network capabilities capped: domain not in allowlist for URL {}",
                url
            )));
        }
        Ok(())
    }
}
