//! Enrichment providers: anything that turns a bounded prompt into text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a provider call produced no usable text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(0)
        } else if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Status(status.as_u16())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// One enrichment call: a unit key plus the rendered, size-bounded context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRequest {
    pub unit: String,
    pub prompt: String,
}

/// Text generator behind the AI context assembler.
///
/// Calls must be independent: the caller runs many at once and cancels any
/// one of them on timeout by dropping its future.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Tag recorded on `Generated` results
    fn tag(&self) -> &str;

    async fn generate(&self, request: &EnrichmentRequest) -> Result<String, ProviderError>;
}

/// Offline provider that summarizes the prompt headings deterministically
#[derive(Debug, Clone, Default)]
pub struct MockProvider;

#[async_trait]
impl EnrichmentProvider for MockProvider {
    fn tag(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &EnrichmentRequest) -> Result<String, ProviderError> {
        let title = request
            .prompt
            .lines()
            .find_map(|l| l.strip_prefix("# "))
            .unwrap_or(request.unit.as_str());
        let headings: Vec<&str> = request
            .prompt
            .lines()
            .filter_map(|l| l.strip_prefix("## "))
            .collect();
        if headings.is_empty() {
            Ok(format!("{}.", title))
        } else {
            Ok(format!("{}: covers {}.", title, headings.join(", ").to_lowercase()))
        }
    }
}

const SYSTEM_PROMPT: &str =
    "Explain the following code unit in 2-3 sentences. Be concise and technical. Use only the facts given.";

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Local Ollama server (`/api/generate`)
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(url: Option<&str>, model: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.unwrap_or("http://localhost:11434").trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl EnrichmentProvider for OllamaProvider {
    fn tag(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &EnrichmentRequest) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": format!("{}\n\n{}", SYSTEM_PROMPT, request.prompt),
            "stream": false
        });
        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        let parsed: OllamaResponse = response.json().await?;
        Ok(parsed.response)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: Option<String>,
}

/// OpenAI-compatible chat completions endpoint
pub struct OpenAiProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiProvider {
    /// The key comes from the config, then `OPENAI_API_KEY`
    pub fn new(
        url: Option<&str>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| ProviderError::Unavailable("OpenAI API key not configured".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.unwrap_or("https://api.openai.com/v1").trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EnrichmentProvider for OpenAiProvider {
    fn tag(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &EnrichmentRequest) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: 400,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("no choices in response".to_string()))
    }
}
