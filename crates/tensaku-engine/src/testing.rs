//! Scripted provider doubles for unit tests.
//!
//! `ScriptedProvider` replays queued event scripts, recording every request
//! it receives. Hooks fire at each fragment boundary so tests can observe
//! or perturb state mid-stream (e.g., simulate a user keystroke between two
//! fragments). `channel_stream_pair` hands the test live control over event
//! timing for in-flight assertions.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tensaku_llm::{LlmError, LlmProvider, LlmResult, LlmStream, StreamEvent, StreamRequest};

type Hook = Box<dyn FnMut(usize) + Send>;

/// Provider that replays queued scripts in order.
pub(crate) struct ScriptedProvider {
    scripts: Mutex<VecDeque<ScriptedStream>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a script of events for the next stream() call.
    pub(crate) fn push_script(&self, events: Vec<StreamEvent>) {
        self.scripts.lock().push_back(ScriptedStream::Replay {
            events: events.into(),
            hook: None,
            index: 0,
        });
    }

    /// Queue a script with a hook invoked before each event is yielded.
    ///
    /// The hook receives the 0-based index of the event about to be
    /// delivered.
    pub(crate) fn push_script_with_hook(
        &self,
        events: Vec<StreamEvent>,
        hook: impl FnMut(usize) + Send + 'static,
    ) {
        self.scripts.lock().push_back(ScriptedStream::Replay {
            events: events.into(),
            hook: Some(Box::new(hook)),
            index: 0,
        });
    }

    /// Queue a channel-fed stream; the test drives it through the sender.
    pub(crate) fn push_stream(&self, stream: ScriptedStream) {
        self.scripts.lock().push_back(stream);
    }

    /// Number of stream() calls made so far.
    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// All requests received so far.
    pub(crate) fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn stream(&self, request: StreamRequest) -> LlmResult<Box<dyn LlmStream>> {
        self.requests.lock().push(request);
        let stream = self
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::Unavailable("no script queued".into()))?;
        Ok(Box::new(stream))
    }
}

/// Test stream: either a canned replay or a live channel.
pub(crate) enum ScriptedStream {
    Replay {
        events: VecDeque<StreamEvent>,
        hook: Option<Hook>,
        index: usize,
    },
    Channel {
        receiver: mpsc::Receiver<StreamEvent>,
        model: String,
    },
}

#[async_trait]
impl LlmStream for ScriptedStream {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        match self {
            Self::Replay { events, hook, index } => {
                if let Some(hook) = hook {
                    hook(*index);
                }
                *index += 1;
                events.pop_front()
            }
            Self::Channel { receiver, .. } => receiver.recv().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::Replay { .. } => "scripted-model",
            Self::Channel { model, .. } => model,
        }
    }
}

/// Create a channel-driven stream plus its sender.
pub(crate) fn channel_stream_pair(
    model: impl Into<String>,
) -> (mpsc::Sender<StreamEvent>, ScriptedStream) {
    let (tx, rx) = mpsc::channel(16);
    (
        tx,
        ScriptedStream::Channel {
            receiver: rx,
            model: model.into(),
        },
    )
}
