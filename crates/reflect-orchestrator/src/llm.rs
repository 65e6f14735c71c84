//! Text generation collaborator.
//!
//! [`TextGenerator`] is the port the step invokers call: given a prompt and
//! sampling parameters it returns the model's text. [`OpenAiClient`] is the
//! production adapter for OpenAI-compatible chat completion endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{LlmErrorKind, ReflectError, Result};

/// One of the three steps of the reflection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Initial phrase generation.
    Generate,
    /// Critique of the current phrase.
    Critique,
    /// Refinement of the previous phrase using its critique.
    Refine,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Critique => write!(f, "critique"),
            Self::Refine => write!(f, "refine"),
        }
    }
}

/// A single prompt sent to the collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Step issuing the request.
    pub step: Step,
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token limit.
    pub max_tokens: u32,
    /// Nucleus sampling parameter.
    pub top_p: f32,
}

/// External text-generation service.
///
/// Implementations classify their failures through
/// [`ReflectError::llm_api_error`] so callers can tell transient failures
/// from fatal ones.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends the prompt and returns the generated text.
    async fn generate(&self, request: &CompletionRequest) -> Result<String>;

    /// Model identifier used by this generator.
    fn model(&self) -> &str;
}

// ============================================================================
// OpenAI-compatible adapter
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
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

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    /// Builds a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ReflectError::llm_api_error(
                    LlmErrorKind::Other,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Full URL requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, request: &CompletionRequest) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ReflectError::llm_api_error(
                LlmErrorKind::Authentication,
                "no API key configured",
            ));
        };

        let body = ChatCompletionBody {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
        };

        debug!(
            step = %request.step,
            model = %self.model,
            prompt_len = request.prompt.len(),
            "Sending completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ReflectError::llm_api_error(
                classify_status(status),
                format!("HTTP {status}: {}", truncate(&detail, 300)),
            ));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            ReflectError::llm_api_error(
                LlmErrorKind::Other,
                format!("malformed completion response: {e}"),
            )
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ReflectError::llm_api_error(LlmErrorKind::Other, "completion contained no text")
            })?;

        debug!(step = %request.step, response_len = text.len(), "Completion received");
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Maps an HTTP status to an error kind.
#[must_use]
pub fn classify_status(status: StatusCode) -> LlmErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmErrorKind::Authentication,
        StatusCode::TOO_MANY_REQUESTS => LlmErrorKind::RateLimit,
        StatusCode::REQUEST_TIMEOUT => LlmErrorKind::Network,
        s if s.is_server_error() => LlmErrorKind::Server,
        _ => LlmErrorKind::Other,
    }
}

fn classify_transport_error(error: reqwest::Error) -> ReflectError {
    let kind = if error.is_timeout() || error.is_connect() || error.is_request() {
        LlmErrorKind::Network
    } else {
        LlmErrorKind::Other
    };
    ReflectError::llm_api_error(kind, format!("request failed: {error}"))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
