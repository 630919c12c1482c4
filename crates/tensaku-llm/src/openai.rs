//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `POST {base_url}/chat/completions` wire shape with
//! `stream: true`: the response body is a server-sent-event stream of
//! `data: ` lines, each carrying a JSON chunk with zero-or-one text delta,
//! terminated by `data: [DONE]`. The reader runs on a spawned task and
//! forwards provider-agnostic [`StreamEvent`]s through a bounded channel;
//! dropping the returned stream drops the receiver, which ends the task and
//! with it the request.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::stream::{LlmStream, StreamEvent, StreamRequest};
use crate::{LlmError, LlmProvider, LlmResult, Message, Usage};

/// Default API endpoint.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Default model to use when none specified.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Buffered events between the reader task and the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// OpenAI-compatible chat-completions provider.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl OpenAiProvider {
    /// Create a provider with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a provider from configuration.
    ///
    /// Fails with [`LlmError::Unavailable`] when no API key can be resolved
    /// from the config or the environment.
    pub fn from_config(config: ProviderConfig) -> LlmResult<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| LlmError::Unavailable("no api key configured".into()))?;

        let mut provider = Self::new(api_key);
        if let Some(base_url) = config.base_url {
            provider.base_url = base_url;
        }
        if let Some(model) = config.default_model {
            provider.default_model = model;
        }
        Ok(provider)
    }

    /// Create a provider from the environment (`OPENAI_API_KEY`).
    pub fn from_env() -> LlmResult<Self> {
        Self::from_config(ProviderConfig::new())
    }

    /// Set the base URL, for proxies or compatible endpoints.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn stream(&self, request: StreamRequest) -> LlmResult<Box<dyn LlmStream>> {
        let payload = WireRequest {
            model: &request.model,
            messages: &request.messages,
            stream: true,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump_sse_body(response, tx));

        Ok(Box::new(OpenAiStream {
            model: request.model,
            receiver: rx,
            finished: false,
        }))
    }
}

/// Streaming response adapter for chat-completions endpoints.
pub struct OpenAiStream {
    model: String,
    receiver: Receiver<StreamEvent>,
    finished: bool,
}

#[async_trait]
impl LlmStream for OpenAiStream {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }

        let event = self.receiver.recv().await?;
        if event.is_terminal() {
            self.finished = true;
        }
        Some(event)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiStream")
            .field("model", &self.model)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Read the SSE body chunk by chunk, forwarding decoded events.
///
/// Exits on the first terminal event, when the body ends, or when the
/// receiver is dropped.
async fn pump_sse_body(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error(format!("stream transport error: {e}")))
                    .await;
                return;
            }
        };

        for event in decoder.feed(&bytes) {
            let terminal = event.is_terminal();
            if tx.send(event).await.is_err() || terminal {
                return;
            }
        }
    }

    let _ = tx.send(decoder.finish()).await;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireStreamResult {
    Chunk(WireChunk),
    Err { error: WireError },
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireErrorEnvelope {
    error: WireError,
}

/// Map a non-2xx response onto the error taxonomy.
fn error_for_status(status: StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<WireErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.to_string()
            } else {
                trimmed.to_string()
            }
        });

    match status.as_u16() {
        401 | 403 => LlmError::AuthError(message),
        429 => LlmError::RateLimited(message),
        400 | 404 | 422 => LlmError::InvalidRequest(message),
        _ => LlmError::ApiError(message),
    }
}

// ============================================================================
// SSE decoding
// ============================================================================

/// Incremental SSE decoder: raw body bytes in, [`StreamEvent`]s out.
///
/// Byte chunks can split lines (and UTF-8 sequences) anywhere, so lines are
/// reassembled from a byte buffer before parsing.
#[derive(Debug, Default)]
struct SseDecoder {
    buf: Vec<u8>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

impl SseDecoder {
    /// Absorb one chunk of body bytes, returning any decoded events.
    fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.decode_line(line.trim_end_matches(['\r', '\n']), &mut events);
        }
        events
    }

    /// The body ended; flush any trailing line and report truncation.
    ///
    /// A well-formed stream terminates with `data: [DONE]`, which ends the
    /// pump before this is reached. Getting here means the connection closed
    /// early.
    fn finish(&mut self) -> StreamEvent {
        if !self.buf.is_empty() {
            let line: Vec<u8> = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&line).to_string();
            let mut events = Vec::new();
            self.decode_line(line.trim_end_matches(['\r', '\n']), &mut events);
            if let Some(event) = events.into_iter().find(|e| e.is_terminal()) {
                return event;
            }
        }
        StreamEvent::Error("stream ended before completion".into())
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        // Non-data lines (comments, event names, blank keep-alives) are ignored.
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();

        if data == "[DONE]" {
            events.push(StreamEvent::Done {
                stop_reason: self.stop_reason.take(),
                usage: self.usage.take(),
            });
            return;
        }

        match serde_json::from_str::<WireStreamResult>(data) {
            Ok(WireStreamResult::Chunk(chunk)) => {
                if let Some(usage) = chunk.usage {
                    self.usage = Some(usage.into());
                }
                for choice in chunk.choices {
                    if let Some(reason) = choice.finish_reason {
                        self.stop_reason = Some(reason);
                    }
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            events.push(StreamEvent::TextDelta(text));
                        }
                    }
                }
            }
            Ok(WireStreamResult::Err { error }) => {
                events.push(StreamEvent::Error(error.message));
            }
            Err(error) => {
                debug!(%error, "skipping unparseable stream line");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_body(body: &str) -> Vec<StreamEvent> {
        let mut decoder = SseDecoder::default();
        decoder.feed(body.as_bytes())
    }

    #[test]
    fn test_decode_deltas_and_done() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"hel\"}}]}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
                    data: [DONE]\n";
        let events = decode_body(body);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("hel".into()),
                StreamEvent::TextDelta("lo".into()),
                StreamEvent::Done {
                    stop_reason: None,
                    usage: None
                },
            ]
        );
    }

    #[test]
    fn test_decode_captures_finish_reason_and_usage() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\
                    data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":2,\"total_tokens\":9}}\n\
                    data: [DONE]\n";
        let events = decode_body(body);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            StreamEvent::Done {
                stop_reason: Some("stop".into()),
                usage: Some(Usage {
                    input_tokens: 7,
                    output_tokens: 2
                }),
            }
        );
    }

    #[test]
    fn test_decode_error_payload() {
        let body = "data: {\"error\":{\"message\":\"model overloaded\",\"type\":\"server_error\"}}\n";
        let events = decode_body(body);
        assert_eq!(events, vec![StreamEvent::Error("model overloaded".into())]);
    }

    #[test]
    fn test_decode_ignores_non_data_lines() {
        let body = ": keep-alive\n\
                    event: message\n\
                    \n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
        let events = decode_body(body);
        assert_eq!(events, vec![StreamEvent::TextDelta("x".into())]);
    }

    #[test]
    fn test_decode_across_chunk_boundaries() {
        // Split mid-line and mid-multibyte-character (the é below).
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{00e9}\"}}]}\n".as_bytes();
        let mut decoder = SseDecoder::default();

        let mut events = Vec::new();
        for chunk in body.chunks(11) {
            events.extend(decoder.feed(chunk));
        }
        assert_eq!(events, vec![StreamEvent::TextDelta("caf\u{00e9}".into())]);
    }

    #[test]
    fn test_truncated_body_reports_error() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n");
        assert_eq!(events.len(), 1);

        // No [DONE] before the body ended.
        assert!(matches!(decoder.finish(), StreamEvent::Error(_)));
    }

    #[test]
    fn test_request_wire_shape() {
        let messages = vec![Message::system("be brief"), Message::user("hello")];
        let payload = WireRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            stream: true,
            temperature: Some(0.7),
            max_tokens: 256,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");

        // temperature is omitted entirely when unset
        let payload = WireRequest {
            model: "m",
            messages: &messages,
            stream: true,
            temperature: None,
            max_tokens: 16,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_error_for_status() {
        let body = "{\"error\":{\"message\":\"bad key\"}}";
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, body),
            LlmError::AuthError(msg) if msg == "bad key"
        ));
        assert!(matches!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            LlmError::RateLimited(msg) if msg == "slow down"
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_REQUEST, "{}"),
            LlmError::InvalidRequest(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            LlmError::ApiError(_)
        ));
    }

    #[test]
    fn test_provider_debug_redacts_key() {
        let provider = OpenAiProvider::new("sk-secret");
        let debug = format!("{provider:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_completions_url_joins_cleanly() {
        let provider = OpenAiProvider::new("k").with_base_url("https://proxy.example/v1/");
        assert_eq!(
            provider.completions_url(),
            "https://proxy.example/v1/chat/completions"
        );
    }
}
