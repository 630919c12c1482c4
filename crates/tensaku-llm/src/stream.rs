//! Provider-agnostic streaming events for completion responses.
//!
//! Each provider converts its native wire events into [`StreamEvent`]s, so
//! the consumer side (the assist engine, chat accumulation) is identical no
//! matter which endpoint produced the text.
//!
//! Contract: a stream yields zero or more `TextDelta` events in arrival
//! order, then at most one terminal event (`Done` or `Error`), then `None`
//! forever. A stream that ends without a terminal event was cut off by the
//! transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Message, Usage};

/// Maximum output tokens when a request does not set one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Provider-agnostic streaming events for completion responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental text fragment.
    TextDelta(String),

    /// Generation completed successfully.
    Done {
        /// Reason generation stopped (e.g., "stop", "length").
        stop_reason: Option<String>,
        /// Token usage, when the endpoint reports it.
        usage: Option<Usage>,
    },

    /// Error during generation.
    Error(String),
}

impl StreamEvent {
    /// Check if this is a text fragment.
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::TextDelta(_))
    }

    /// Check if this is a terminal event (Done or Error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error(_))
    }

    /// Extract the fragment text if this is a delta event.
    pub fn as_delta(&self) -> Option<&str> {
        match self {
            Self::TextDelta(text) => Some(text),
            _ => None,
        }
    }
}

/// Trait for in-flight streaming responses.
///
/// Implementations convert provider-specific streaming payloads into the
/// common [`StreamEvent`] format.
#[async_trait]
pub trait LlmStream: Send {
    /// Poll for the next streaming event.
    ///
    /// Returns `None` once the stream is exhausted (after a terminal event).
    async fn next_event(&mut self) -> Option<StreamEvent>;

    /// Get the model name being used for this stream.
    fn model(&self) -> &str;
}

/// Builder for constructing streaming requests.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// The model to use.
    pub model: String,
    /// Ordered conversation messages; conventionally a system message first.
    pub messages: Vec<Message>,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl StreamRequest {
    /// Create a new streaming request.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}
