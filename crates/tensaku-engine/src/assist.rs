//! Selection-scoped streaming assistance.
//!
//! One [`AssistEngine`] per document surface. Triggering an assist captures
//! the selection once, opens a streaming completion request, and projects
//! the growing accumulated text onto the captured range as fragments
//! arrive: the first fragment replaces the selected text, every later
//! fragment replaces the span the engine wrote so far, so the visible
//! document always matches the latest accumulated text without
//! reprocessing anything.
//!
//! At most one streaming operation (assist or chat) is active per engine;
//! a trigger while one is running is rejected before any request is made.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tensaku_llm::{LlmProvider, Message, StreamEvent, StreamRequest};

use crate::document::{DocumentView, Selection};
use crate::error::{EngineError, EngineResult};

/// Default temperature for assist and chat requests.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default maximum output tokens for assist and chat requests.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// The selection-scoped actions an engine can run.
///
/// All variants share one state machine; a kind contributes only its
/// instruction text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssistKind {
    /// Condense the selection.
    Summarize,
    /// Polish the selection's clarity and flow.
    Improve,
    /// Continue writing from the selection.
    Complete,
}

impl AssistKind {
    /// Get a human-readable name for this action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Improve => "improve",
            Self::Complete => "complete",
        }
    }

    /// System instruction for this action.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Summarize => {
                "You are a writing assistant that condenses text. Reply with the \
                 summary only - no preamble, no commentary, no surrounding quotes."
            }
            Self::Improve => {
                "You are a writing assistant that polishes prose. Reply with the \
                 revised text only - no preamble, no commentary, no surrounding quotes."
            }
            Self::Complete => {
                "You are a writing assistant that continues a draft. Reply with the \
                 completed passage only - no preamble, no commentary, no surrounding quotes."
            }
        }
    }

    /// User prompt wrapping the selected text.
    pub fn user_prompt(&self, selected: &str) -> String {
        match self {
            Self::Summarize => {
                format!("Summarize the following text, keeping the author's tone:\n\n{selected}")
            }
            Self::Improve => format!(
                "Improve the clarity and flow of the following text, preserving its meaning:\n\n{selected}"
            ),
            Self::Complete => format!(
                "Continue the following text. Reply with the original text followed by your continuation:\n\n{selected}"
            ),
        }
    }
}

/// Fixed generation configuration for an engine.
///
/// These are deployment constants, not per-request knobs.
#[derive(Debug, Clone)]
pub struct AssistConfig {
    /// Model override; the provider's default model when unset.
    pub model: Option<String>,
    /// Temperature for all requests.
    pub temperature: Option<f32>,
    /// Maximum output tokens for all requests.
    pub max_tokens: u32,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl AssistConfig {
    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature.
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

/// Per-operation streaming state.
///
/// `window_end` is the end of the span the next replacement overwrites. It
/// starts at the captured selection's end (the first fragment replaces the
/// selected text itself) and thereafter tracks how much text the engine has
/// inserted. `expected_revision` is the document revision after the
/// engine's own last write.
#[derive(Debug, Default)]
struct OperationState {
    active: bool,
    captured: Option<Selection>,
    window_end: usize,
    expected_revision: u64,
    last_error: Option<EngineError>,
}

/// Streaming assist engine bound to one document surface and one provider.
///
/// Both collaborators are injected and shared; the engine holds no process
/// globals. Call [`shutdown`](Self::shutdown) on teardown so no request
/// outlives its consumer.
pub struct AssistEngine {
    pub(crate) doc: Arc<dyn DocumentView>,
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) config: AssistConfig,
    pub(crate) cancel: CancellationToken,
    state: Mutex<OperationState>,
}

impl std::fmt::Debug for AssistEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistEngine")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish()
    }
}

impl AssistEngine {
    /// Create an engine with default configuration.
    pub fn new(doc: Arc<dyn DocumentView>, provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_config(doc, provider, AssistConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(
        doc: Arc<dyn DocumentView>,
        provider: Arc<dyn LlmProvider>,
        config: AssistConfig,
    ) -> Self {
        Self {
            doc,
            provider,
            config,
            cancel: CancellationToken::new(),
            state: Mutex::new(OperationState::default()),
        }
    }

    /// Check if a streaming operation is in flight.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Error recorded by the most recent operation, if any.
    ///
    /// Cleared when the next operation starts.
    pub fn last_error(&self) -> Option<EngineError> {
        self.state.lock().last_error.clone()
    }

    /// Cancel any in-flight streaming operation.
    ///
    /// Teardown contract: hosts call this before releasing the engine so no
    /// network request outlives its consumer. Cancellation is observed at
    /// the next fragment boundary.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run a selection-scoped assist action.
    ///
    /// Captures the current selection, streams a completion for it, and
    /// replaces the captured range with the accumulated response as
    /// fragments arrive. Returns the full accumulated text.
    pub async fn run_assist(&self, kind: AssistKind) -> EngineResult<String> {
        let (selection, selected) = self.begin_assist()?;
        debug!(
            kind = kind.name(),
            from = selection.from,
            to = selection.to,
            "assist stream starting"
        );

        let request = self.build_request(vec![
            Message::system(kind.system_prompt()),
            Message::user(kind.user_prompt(&selected)),
        ]);

        let result = self.stream_into_selection(selection, request).await;
        match &result {
            Ok(text) => {
                debug!(
                    kind = kind.name(),
                    chars = text.chars().count(),
                    "assist stream finished"
                );
                self.finish(None);
            }
            Err(e) => {
                warn!(kind = kind.name(), error = %e, "assist stream aborted");
                self.finish(Some(e));
            }
        }
        result
    }

    /// Gate and capture for an assist operation.
    ///
    /// Rejections here leave the state untouched: `Busy` and
    /// `EmptySelection` are no-ops, not recorded failures.
    fn begin_assist(&self) -> EngineResult<(Selection, String)> {
        let mut state = self.state.lock();
        if state.active {
            return Err(EngineError::Busy);
        }

        let selection = self.doc.selection();
        if selection.is_empty() {
            return Err(EngineError::EmptySelection);
        }
        let selected = self.doc.text_between(selection.from, selection.to)?;

        state.active = true;
        state.captured = Some(selection);
        state.window_end = selection.to;
        state.expected_revision = self.doc.revision();
        state.last_error = None;
        Ok((selection, selected))
    }

    /// Gate for a chat operation (no capture, no document mutation).
    pub(crate) fn begin_chat(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.active {
            return Err(EngineError::Busy);
        }
        state.active = true;
        state.captured = None;
        state.window_end = 0;
        state.last_error = None;
        Ok(())
    }

    /// Return the state machine to idle, recording a terminal error if any.
    ///
    /// Does not clear `last_error` on success: a `ReplaceFailed` recorded
    /// mid-stream stays visible after the operation completes.
    pub(crate) fn finish(&self, error: Option<&EngineError>) {
        let mut state = self.state.lock();
        state.active = false;
        state.captured = None;
        state.window_end = 0;
        if let Some(error) = error {
            state.last_error = Some(error.clone());
        }
    }

    /// Assemble a request from the engine's fixed configuration.
    pub(crate) fn build_request(&self, messages: Vec<Message>) -> StreamRequest {
        let model = self
            .config
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());
        let mut request = StreamRequest::new(model, messages).with_max_tokens(self.config.max_tokens);
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }

    /// Consume the stream, projecting accumulated text onto the selection.
    async fn stream_into_selection(
        &self,
        selection: Selection,
        request: StreamRequest,
    ) -> EngineResult<String> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let mut stream = self.provider.stream(request).await.map_err(EngineError::from)?;
        let mut accumulated = String::new();

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(EngineError::Cancelled),
                event = stream.next_event() => event,
            };
            let Some(event) = event else { break };

            match event {
                StreamEvent::TextDelta(fragment) => {
                    accumulated.push_str(&fragment);
                    self.apply_replacement(selection, &accumulated)?;
                }
                StreamEvent::Done { stop_reason, .. } => {
                    debug!(stop_reason = ?stop_reason, "completion stream done");
                }
                StreamEvent::Error(message) => {
                    return Err(EngineError::CompletionFailed(message));
                }
            }
        }

        Ok(accumulated)
    }

    /// Replace the tracked window with the full accumulated text.
    ///
    /// A rejected replace is recorded and the stream keeps going; the window
    /// advances only on success, so the next fragment retries the whole
    /// accumulated text. A document mutated from elsewhere aborts the
    /// operation instead of writing at a misplaced offset.
    fn apply_replacement(&self, selection: Selection, accumulated: &str) -> EngineResult<()> {
        let (window_end, expected_revision) = {
            let state = self.state.lock();
            (state.window_end, state.expected_revision)
        };

        let observed = self.doc.revision();
        if observed != expected_revision {
            warn!(
                expected = expected_revision,
                observed, "document changed underneath the stream"
            );
            return Err(EngineError::StaleDocument);
        }

        match self.doc.replace_range(selection.from, window_end, accumulated) {
            Ok(()) => {
                let mut state = self.state.lock();
                state.window_end = selection.from + accumulated.chars().count();
                state.expected_revision = self.doc.revision();
            }
            Err(e) => {
                warn!(error = %e, "replacement rejected, continuing stream");
                self.state.lock().last_error = Some(EngineError::ReplaceFailed(e));
            }
        }
        Ok(())
    }
}
