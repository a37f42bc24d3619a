//! Model service abstraction.
//!
//! The [`ModelClient`] trait decouples the pipeline stages from the actual
//! completion backend (an OpenAI-compatible chat-completions endpoint).
//! Tests use scripted clients that return predetermined completions without
//! touching the network.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::ModelError;
use crate::io::config::ServiceConfig;

/// Parameters for one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Model identifier, chosen per stage.
    pub model: String,
    /// System message sent ahead of the prompt.
    pub system_context: String,
    /// User prompt. Must be non-empty.
    pub prompt: String,
}

/// Abstraction over completion backends.
pub trait ModelClient {
    /// Perform exactly one completion exchange. No caching.
    fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Build a client from service config, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("read API key from ${}", config.api_key_env))?;
        if api_key.trim().is_empty() {
            return Err(anyhow!("${} is empty", config.api_key_env));
        }
        Self::new(&config.base_url, api_key, Duration::from_secs(config.timeout_secs))
    }

    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

impl ModelClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %request.model, prompt_bytes = request.prompt.len()))]
    fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        if request.prompt.trim().is_empty() {
            return Err(ModelError::InvalidRequest("prompt is empty".to_string()));
        }

        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_context,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|err| ModelError::Transient(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "model service returned an error");
            return Err(classify_status(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|err| ModelError::Transient(format!("malformed response body: {err}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Transient("response contained no choices".to_string()))?;

        debug!(completion_bytes = content.len(), "model call completed");
        Ok(content)
    }
}

/// Map a non-success HTTP status onto the retry taxonomy.
fn classify_status(status: StatusCode, body: &str) -> ModelError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    let retryable = status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS
        );
    if retryable {
        ModelError::Transient(message)
    } else {
        ModelError::InvalidRequest(message)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
