//! Completion client for tensaku.
//!
//! This crate provides a unified interface for streaming chat completions
//! from hosted, OpenAI-compatible endpoints. Providers implement
//! [`LlmProvider`] and hand back a [`LlmStream`] of provider-agnostic
//! [`StreamEvent`]s; the assist engine consumes those events without
//! knowing anything about the wire format.

mod config;
mod openai;
pub mod stream;

pub use config::ProviderConfig;
pub use openai::{OpenAiProvider, DEFAULT_MODEL, OPENAI_API_URL};
pub use stream::{LlmStream, StreamEvent, StreamRequest, DEFAULT_MAX_TOKENS};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction framing the request; conventionally the first message.
    System,
    /// Human/user message.
    User,
    /// Assistant/model message.
    Assistant,
}

/// A message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message.
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token usage reported by the endpoint, when available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
}

impl Usage {
    /// Total tokens (input + output).
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Fully assembled response, for callers that do not need incremental text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated text content.
    pub content: String,
    /// Model that generated the response.
    pub model: String,
    /// Reason the generation stopped.
    pub stop_reason: Option<String>,
    /// Token usage statistics.
    pub usage: Usage,
}

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Provider not configured or unavailable.
    #[error("provider not available: {0}")]
    Unavailable(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Rate limited.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// API error.
    #[error("api error: {0}")]
    ApiError(String),

    /// Network error.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Trait for completion providers.
///
/// A provider opens one streaming request per [`stream`](Self::stream) call.
/// The returned stream is finite and not restartable; retrying means making
/// a fresh call. Providers perform no caching and no automatic retry.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai").
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Check if the provider is ready (has credentials, connection, etc.).
    async fn is_available(&self) -> bool;

    /// Open a streaming completion request.
    async fn stream(&self, request: StreamRequest) -> LlmResult<Box<dyn LlmStream>>;

    /// Non-incremental convenience: drain a stream into one response.
    async fn complete(&self, request: StreamRequest) -> LlmResult<CompletionResponse> {
        let mut stream = self.stream(request).await?;
        let model = stream.model().to_string();
        let mut content = String::new();
        let mut stop_reason = None;
        let mut usage = Usage::default();

        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::TextDelta(text) => content.push_str(&text),
                StreamEvent::Done {
                    stop_reason: reason,
                    usage: reported,
                } => {
                    stop_reason = reason;
                    if let Some(reported) = reported {
                        usage = reported;
                    }
                }
                StreamEvent::Error(message) => return Err(LlmError::ApiError(message)),
            }
        }

        Ok(CompletionResponse {
            content,
            model,
            stop_reason,
            usage,
        })
    }

    /// Simple prompt helper - sends a single user message.
    async fn prompt(&self, model: &str, prompt: &str) -> LlmResult<String> {
        let request = StreamRequest::new(model, vec![Message::user(prompt)]);
        let response = self.complete(request).await?;
        Ok(response.content)
    }
}
