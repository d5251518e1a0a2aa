use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

/// Turns a prompt plus one input text into a structured result.
///
/// Implementations must not fail: any problem is logged and reported as
/// `None`, which the batch runner records as a processed item with a null
/// result.
pub trait Extractor {
    fn extract(&self, prompt: &str, text: &str) -> Option<Value>;
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured (set KG_LLM_API_KEY)")]
    MissingApiKey,

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model returned no message content")]
    EmptyResponse,

    #[error("model output is not a JSON object: {0}")]
    InvalidJson(String),
}

// ── OpenAI-compatible chat completions ─────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking client for a `/chat/completions` endpoint that supports
/// `response_format: json_object`.
pub struct ChatClient {
    http: reqwest::blocking::Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(LlmError::MissingApiKey);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| LlmError::Http {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// One round trip; errors are returned, not swallowed.
    pub fn try_extract(&self, prompt: &str, text: &str) -> Result<Value, LlmError> {
        let url = self.endpoint();
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": prompt},
                {"role": "user", "content": text},
            ],
            "temperature": self.config.temperature,
            "response_format": {"type": "json_object"},
        });

        let http_err = |source| LlmError::Http {
            url: url.clone(),
            source,
        };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .map_err(http_err)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().map_err(http_err)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;
        debug!(chars = content.len(), "model replied");
        parse_json_object(&content)
    }
}

impl Extractor for ChatClient {
    fn extract(&self, prompt: &str, text: &str) -> Option<Value> {
        match self.try_extract(prompt, text) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "extraction failed");
                None
            }
        }
    }
}

/// Parse the model's reply. Some models wrap JSON in a markdown fence even
/// in JSON mode, so one surrounding fence is tolerated.
pub fn parse_json_object(content: &str) -> Result<Value, LlmError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    match serde_json::from_str::<Value>(unfenced) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => Ok(v),
        Ok(other) => Err(LlmError::InvalidJson(format!("unexpected top-level value {other}"))),
        Err(e) => Err(LlmError::InvalidJson(e.to_string())),
    }
}
