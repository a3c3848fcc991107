//! LLM backend trait and concrete implementations.
//!
//! Backends:
//!   GeminiBackend           — Google Gemini API (gemini-2.5-pro, flash, …)
//!   OpenAiCompatibleBackend — OpenAI or any OpenAI-compatible endpoint
//!                             (Ollama, vLLM, LMStudio, OpenRouter, …)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use biodigest_common::sandbox::SandboxClient;
use biodigest_common::DigestError;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("Empty completion")]
    EmptyResponse,
    #[error("Request blocked: {0}")]
    Blocked(String),
}

impl From<DigestError> for LlmError {
    fn from(err: DigestError) -> Self {
        match err {
            DigestError::SecurityError(msg) => LlmError::Blocked(msg),
            other => LlmError::Unavailable(other.to_string()),
        }
    }
}

impl LlmError {
    /// Network failures, throttling, server-side errors and empty
    /// completions are worth another attempt; client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(e) => !e.is_builder() && !e.is_decode(),
            LlmError::Unavailable(_) | LlmError::RateLimitExceeded | LlmError::EmptyResponse => true,
            LlmError::ApiError { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            LlmError::Serde(_) | LlmError::Blocked(_) => false,
        }
    }
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the backend for a JSON object response.
    #[serde(default)]
    pub json_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
}

// ── Provider selection ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    /// Any OpenAI-compatible server at `base_url` (Ollama, vLLM, …).
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

/// Build the configured backend.
pub fn build_backend(
    provider: Provider,
    model: &str,
    base_url: Option<&str>,
    api_key: Option<String>,
    timeout: Duration,
) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let backend: Arc<dyn LlmBackend> = match provider {
        Provider::Gemini => {
            let key = api_key.ok_or_else(|| LlmError::Unavailable("Gemini requires an API key".into()))?;
            let mut b = GeminiBackend::new(key, model, timeout)?;
            if let Some(url) = base_url {
                b = b.with_base_url(url)?;
            }
            Arc::new(b)
        }
        Provider::OpenAi => {
            let key = api_key.ok_or_else(|| LlmError::Unavailable("OpenAI requires an API key".into()))?;
            let url = base_url.unwrap_or(OPENAI_BASE_URL);
            Arc::new(OpenAiCompatibleBackend::new(url, model, Some(key), timeout)?)
        }
        Provider::OpenAiCompatible => {
            let url = base_url
                .ok_or_else(|| LlmError::Unavailable("openai_compatible requires llm.base_url".into()))?;
            Arc::new(OpenAiCompatibleBackend::new(url, model, api_key, timeout)?)
        }
    };
    Ok(backend)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Allowlisted client that may also reach the host of `base_url`.
fn http_client(timeout: Duration, base_url: &str) -> Result<SandboxClient, LlmError> {
    let mut client = SandboxClient::with_timeout(timeout)?;
    client.allow_url_host(base_url)?;
    Ok(client)
}

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    LlmResponse {
        content: json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

fn parse_gemini_response(json: &serde_json::Value, model: &str) -> LlmResponse {
    let content = json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect::<Vec<_>>().join(""))
        .unwrap_or_default();

    LlmResponse {
        content,
        model: model.to_string(),
        prompt_tokens:     json["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    if status == 429 {
        return Err(LlmError::RateLimitExceeded);
    }
    let text = resp.text().await?;
    let body: serde_json::Value = match serde_json::from_str(&text) {
        Ok(body) => body,
        Err(_) if status >= 400 => {
            return Err(LlmError::ApiError { status, message: text.chars().take(200).collect() });
        }
        Err(e) => return Err(e.into()),
    };
    if status >= 400 {
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(LlmError::ApiError { status, message: msg });
    }
    Ok(body)
}

fn non_empty(resp: LlmResponse) -> Result<LlmResponse, LlmError> {
    if resp.content.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(resp)
}

// ── 1. OpenAI-compatible ──────────────────────────────────────────────────────

const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub model: String,
    api_key: Option<String>,
    client: SandboxClient,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let base_url = base_url.into();
        Ok(Self {
            client: http_client(timeout, &base_url)?,
            base_url,
            model: model.into(),
            api_key,
        })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => req.bearer_auth(k),
            None    => req,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let mut body = serde_json::json!({
            "model":       req.model.as_deref().unwrap_or(&self.model),
            "messages":    req.messages,
            "max_tokens":  req.max_tokens.unwrap_or(4096),
            "temperature": req.temperature.unwrap_or(0.3),
        });
        if req.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        let resp = self.auth(self.client.post(&url)?).json(&body).send().await?;
        let json = check_response_status(resp).await?;
        non_empty(parse_openai_response(&json, &self.model))
    }

    fn model_id(&self) -> &str { &self.model }

    fn is_local(&self) -> bool {
        self.base_url.contains("localhost") || self.base_url.contains("127.0.0.1")
    }
}

// ── 2. Google Gemini ──────────────────────────────────────────────────────────

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiBackend {
    pub model: String,
    base_url: String,
    api_key: String,
    client: SandboxClient,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            client: http_client(timeout, GEMINI_BASE_URL)?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Result<Self, LlmError> {
        self.base_url = base_url.into();
        self.client.allow_url_host(&self.base_url)?;
        Ok(self)
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = req.model.as_deref().unwrap_or(&self.model);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );

        // System message → systemInstruction
        let system_text = req.messages.iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone());

        let contents: Vec<serde_json::Value> = req.messages.iter()
            .filter(|m| m.role != "system")
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": m.content }]
                })
            })
            .collect();

        let mut generation = serde_json::json!({
            "maxOutputTokens": req.max_tokens.unwrap_or(4096),
            "temperature":     req.temperature.unwrap_or(0.3),
            "topP":            0.95,
        });
        if req.json_mode {
            generation["responseMimeType"] = serde_json::json!("application/json");
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": generation,
        });
        if let Some(sys) = system_text {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": sys }]
            });
        }

        let resp = self.client
            .post(&url)?
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        non_empty(parse_gemini_response(&json, model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_gemini_backend_is_not_local() {
        let b = GeminiBackend::new("AIza-test", "gemini-2.5-pro", TIMEOUT).unwrap();
        assert!(!b.is_local());
        assert_eq!(b.model_id(), "gemini-2.5-pro");
    }

    #[test]
    fn test_openai_compatible_with_no_key() {
        let b = OpenAiCompatibleBackend::new("http://localhost:11434", "llama3:8b", None, TIMEOUT).unwrap();
        assert!(b.is_local());
        assert_eq!(b.model_id(), "llama3:8b");
    }

    #[test]
    fn test_backends_use_allowlisted_client() {
        let b = OpenAiCompatibleBackend::new("http://gpu-box.lan:11434", "llama3", None, TIMEOUT).unwrap();
        assert!(b.client.is_allowed("http://gpu-box.lan:11434/v1/chat/completions"));
        assert!(!b.client.is_allowed("https://evil.example.com/v1/chat/completions"));
        assert!(OpenAiCompatibleBackend::new("not a url", "m", None, TIMEOUT).is_err());

        let g = GeminiBackend::new("AIza-test", "gemini-2.5-pro", TIMEOUT).unwrap();
        assert!(g.client.post("https://evil.example.com/x").is_err());
        let err = LlmError::from(DigestError::SecurityError("blocked".into()));
        assert!(matches!(err, LlmError::Blocked(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_build_backend_requires_key() {
        let err = build_backend(Provider::Gemini, "gemini-2.5-pro", None, None, TIMEOUT).err();
        assert!(matches!(err, Some(LlmError::Unavailable(_))));
        let ok = build_backend(Provider::OpenAi, "gpt-4o-mini", None, Some("sk".into()), TIMEOUT).unwrap();
        assert_eq!(ok.model_id(), "gpt-4o-mini");
        assert!(build_backend(Provider::OpenAiCompatible, "m", None, None, TIMEOUT).is_err());
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::RateLimitExceeded.is_transient());
        assert!(LlmError::ApiError { status: 503, message: String::new() }.is_transient());
        assert!(!LlmError::ApiError { status: 400, message: String::new() }.is_transient());
        assert!(LlmError::EmptyResponse.is_transient());
    }

    #[test]
    fn test_parse_responses() {
        let openai = serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [{ "message": { "content": "{\"keep\": true}" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 3 }
        });
        let r = parse_openai_response(&openai, "fallback");
        assert_eq!(r.content, "{\"keep\": true}");
        assert_eq!(r.prompt_tokens, 10);

        let gemini = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } }],
            "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 2 }
        });
        let r = parse_gemini_response(&gemini, "gemini-2.5-pro");
        assert_eq!(r.content, "{\"a\":1}");
        assert_eq!(r.completion_tokens, 2);
    }

    #[test]
    fn test_provider_serde() {
        let p: Provider = serde_json::from_str("\"openai_compatible\"").unwrap();
        assert_eq!(p, Provider::OpenAiCompatible);
    }
}
