//! Error types for engine operations.
//!
//! Every failure path returns the operation state machine to idle, so a
//! subsequent action can be retried. Nothing here is fatal to the host.

use thiserror::Error;

use crate::document::DocumentError;
use tensaku_llm::LlmError;

/// Errors that can occur while running an assist or chat operation.
///
/// `EmptySelection`, `EmptyMessage` and `Busy` are local no-ops: they are
/// returned to the caller before any request is issued and are never
/// recorded as the operation's error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// An AI action was triggered with nothing selected.
    #[error("nothing is selected")]
    EmptySelection,

    /// A chat send was triggered with a blank message.
    #[error("message is empty")]
    EmptyMessage,

    /// Another streaming operation is active on this engine.
    #[error("another streaming operation is active")]
    Busy,

    /// The document rejected a mid-stream replacement.
    ///
    /// Recorded but non-fatal: the stream keeps consuming fragments so
    /// partial progress is not lost.
    #[error("replacement rejected: {0}")]
    ReplaceFailed(DocumentError),

    /// The completion request or its stream failed.
    #[error("completion failed: {0}")]
    CompletionFailed(String),

    /// The document was mutated from elsewhere while streaming.
    #[error("document changed during streaming")]
    StaleDocument,

    /// The operation was cancelled through the engine's teardown token.
    #[error("operation cancelled")]
    Cancelled,

    /// A document read failed while capturing the operation.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),
}

impl From<LlmError> for EngineError {
    fn from(e: LlmError) -> Self {
        Self::CompletionFailed(e.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_maps_to_completion_failed() {
        let err: EngineError = LlmError::NetworkError("connection refused".into()).into();
        match err {
            EngineError::CompletionFailed(msg) => assert!(msg.contains("connection refused")),
            other => panic!("expected CompletionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_document_error_wraps() {
        let err: EngineError = DocumentError::InvalidRange { from: 3, to: 1 }.into();
        assert!(matches!(err, EngineError::Document(_)));
        assert!(err.to_string().contains("3"));
    }
}
