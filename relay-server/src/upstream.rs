//! Upstream completion client.
//!
//! Sends the full conversation to an OpenAI-style chat completions endpoint
//! and returns `choices[0].message.content`. The whole history goes out on
//! every turn; nothing is truncated.

use crate::message::Message;
use async_trait::async_trait;
use relay_common::config::UpstreamConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Failure talking to the completion API.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream request failed: {0}")]
    Transport(String),

    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// HTTP status returned by the upstream, if it got that far.
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Something that can turn a conversation into an assistant reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete the conversation, returning the assistant's text.
    async fn complete(&self, messages: &[Message]) -> Result<String, UpstreamError>;
}

/// HTTP client for the configured completion endpoint.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout: Duration,
}

impl HttpCompletionClient {
    /// Build a client from upstream configuration.
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| anyhow::anyhow!("Invalid upstream token: {}", e))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            timeout: config.timeout(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, UpstreamError> {
        let start = Instant::now();

        let request = CompletionRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout(self.timeout)
                } else {
                    UpstreamError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                latency_ms,
                "Upstream returned an error status"
            );
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(self.timeout)
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;

        let content = extract_content(&body)?;

        tracing::debug!(
            model = %self.model,
            history_len = messages.len(),
            latency_ms,
            "Upstream completion received"
        );

        Ok(content)
    }
}

/// Pull `choices[0].message.content` out of a completion body.
fn extract_content(body: &[u8]) -> Result<String, UpstreamError> {
    let parsed: CompletionResponse =
        serde_json::from_slice(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| UpstreamError::Malformed("response contained no choices".into()))
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}
