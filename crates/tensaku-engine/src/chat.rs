//! Chat transcript and document-grounded chat send.
//!
//! A [`Transcript`] is an append-only sequence of user/assistant entries.
//! Sending pushes the user entry immediately, streams a completion grounded
//! in the document (the selection when there is one, the full export
//! otherwise), and appends exactly one assistant entry once the response
//! has fully accumulated. Chat shares the engine's one-active-operation
//! gate with the selection assists.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tensaku_llm::{Message, StreamEvent, StreamRequest};

use crate::assist::AssistEngine;
use crate::error::{EngineError, EngineResult};
use crate::now_millis;

/// Who authored a chat entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The human.
    User,
    /// The model.
    Assistant,
}

/// One entry in a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Who authored this entry.
    pub role: ChatRole,
    /// Entry text.
    pub content: String,
    /// When the entry was appended (Unix millis).
    pub at: u64,
}

impl ChatEntry {
    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: now_millis(),
        }
    }
}

/// Append-only conversation transcript.
///
/// Past entries are never edited or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    id: String,
    entries: Vec<ChatEntry>,
    created_at: u64,
    updated_at: u64,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        let now = now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Unique identifier for this transcript.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a user entry.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.entries.push(ChatEntry::new(ChatRole::User, content));
        self.touch();
    }

    /// Append an assistant entry.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.entries.push(ChatEntry::new(ChatRole::Assistant, content));
        self.touch();
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entry.
    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// System instruction embedding the grounding context.
fn chat_system_prompt(context: &str) -> String {
    format!(
        "You are a writing assistant embedded in a text editor. Answer \
         questions about the document excerpt below and use it as context \
         for the conversation.\n\n---\n{context}\n---"
    )
}

impl AssistEngine {
    /// Send a chat message grounded in the document.
    ///
    /// The user entry is appended before the request goes out; the
    /// assistant entry is appended only once the streamed response has
    /// fully accumulated. On failure the user entry stays, no assistant
    /// entry is appended, and the error is recorded. A blank input is a
    /// local no-op.
    pub async fn send_chat(
        &self,
        transcript: &mut Transcript,
        input: &str,
    ) -> EngineResult<String> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        self.begin_chat()?;
        transcript.push_user(input);
        debug!(
            transcript = transcript.id(),
            entries = transcript.len(),
            "chat stream starting"
        );

        let request = self.build_chat_request(transcript);
        let result = self.stream_accumulated(request).await;
        match &result {
            Ok(reply) => {
                transcript.push_assistant(reply.clone());
                self.finish(None);
            }
            Err(e) => {
                warn!(error = %e, "chat stream aborted");
                self.finish(Some(e));
            }
        }
        result
    }

    /// Build the message list: grounding context plus the running transcript.
    fn build_chat_request(&self, transcript: &Transcript) -> StreamRequest {
        let selection = self.doc.selection();
        let context = if selection.is_empty() {
            self.doc.export_markup()
        } else {
            self.doc
                .text_between(selection.from, selection.to)
                .unwrap_or_else(|_| self.doc.export_text())
        };

        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(Message::system(chat_system_prompt(&context)));
        for entry in transcript.entries() {
            messages.push(match entry.role {
                ChatRole::User => Message::user(entry.content.clone()),
                ChatRole::Assistant => Message::assistant(entry.content.clone()),
            });
        }
        self.build_request(messages)
    }

    /// Drain the stream into one string, observing cancellation.
    async fn stream_accumulated(&self, request: StreamRequest) -> EngineResult<String> {
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
                StreamEvent::TextDelta(fragment) => accumulated.push_str(&fragment),
                StreamEvent::Done { stop_reason, .. } => {
                    debug!(stop_reason = ?stop_reason, "chat stream done");
                }
                StreamEvent::Error(message) => {
                    return Err(EngineError::CompletionFailed(message));
                }
            }
        }

        Ok(accumulated)
    }
}
