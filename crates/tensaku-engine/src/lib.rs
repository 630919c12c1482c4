//! # tensaku-engine
//!
//! Selection-scoped streaming AI assistance over an abstract document
//! surface.
//!
//! The engine owns one small piece of hard logic: projecting a growing,
//! incrementally streamed completion onto a fixed document range so the
//! visible text always matches the latest accumulated response. Everything
//! around it is the contract that makes that safe:
//!
//! - [`DocumentView`] — the four-operation surface contract (selection,
//!   span read, span replace, export) plus a revision counter
//! - [`AssistEngine`] — the one-operation-at-a-time state machine driving
//!   summarize / improve / complete over the current selection
//! - [`Transcript`] + [`AssistEngine::send_chat`] — document-grounded chat
//!   with an append-only history
//!
//! Providers come from `tensaku-llm`; the engine only sees the
//! [`LlmProvider`](tensaku_llm::LlmProvider) trait.

pub mod assist;
pub mod chat;
pub mod document;
pub mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use assist::{AssistConfig, AssistEngine, AssistKind, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
pub use chat::{ChatEntry, ChatRole, Transcript};
pub use document::{DocumentError, DocumentResult, DocumentView, MemoryDocument, Selection};
pub use error::{EngineError, EngineResult};

/// Current time as Unix milliseconds. Used by transcript constructors.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
