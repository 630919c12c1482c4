//! Document surface contract and in-memory implementation.
//!
//! The engine never talks to a concrete editor widget. It depends on the
//! small [`DocumentView`] contract: read the selection, read a span, replace
//! a span, export the whole document. Offsets are char offsets into the
//! document's flat text space; byte translation is an implementation detail
//! of each surface.
//!
//! [`MemoryDocument`] backs the contract with a plain string and is what the
//! tests (and any headless host) drive.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A selection in the document's flat char-offset space.
///
/// Always normalized so `from <= to`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Start offset (inclusive).
    pub from: usize,
    /// End offset (exclusive).
    pub to: usize,
}

impl Selection {
    /// Create a selection, swapping the endpoints if given backwards.
    ///
    /// Editor surfaces report backwards selections when the user dragged
    /// right-to-left; the engine only ever works with ordered ranges.
    pub fn new(from: usize, to: usize) -> Self {
        if from <= to {
            Self { from, to }
        } else {
            Self { from: to, to: from }
        }
    }

    /// A collapsed selection (caret) at the given offset.
    pub fn caret(offset: usize) -> Self {
        Self {
            from: offset,
            to: offset,
        }
    }

    /// Check if the selection is collapsed.
    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Length of the selection in chars.
    pub fn len(&self) -> usize {
        self.to - self.from
    }
}

/// Errors reported by a document surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
    /// The requested span does not fit the document.
    #[error("range {from}..{to} is out of bounds (document has {len} chars)")]
    RangeOutOfBounds {
        /// Requested start offset.
        from: usize,
        /// Requested end offset.
        to: usize,
        /// Current document length in chars.
        len: usize,
    },

    /// The span's start lies after its end.
    #[error("range start {from} is after end {to}")]
    InvalidRange {
        /// Requested start offset.
        from: usize,
        /// Requested end offset.
        to: usize,
    },
}

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Contract between the engine and whatever renders the document.
///
/// Mutation goes through `&self`: surfaces are shared between the engine and
/// their host, so implementations use interior mutability.
pub trait DocumentView: Send + Sync {
    /// Current selection.
    fn selection(&self) -> Selection;

    /// Text between two char offsets.
    fn text_between(&self, from: usize, to: usize) -> DocumentResult<String>;

    /// Replace the content between two char offsets with the given text.
    fn replace_range(&self, from: usize, to: usize, text: &str) -> DocumentResult<()>;

    /// Full document as plain text.
    fn export_text(&self) -> String;

    /// Full document in the surface's richer markup, when it has one.
    ///
    /// Surfaces without a markup representation return the plain text.
    fn export_markup(&self) -> String {
        self.export_text()
    }

    /// Monotonic counter bumped on every mutation.
    ///
    /// The engine compares revisions across its own replacements to detect
    /// edits arriving from elsewhere while a stream is in flight.
    fn revision(&self) -> u64;
}

/// String-backed document surface.
pub struct MemoryDocument {
    text: RwLock<String>,
    selection: RwLock<Selection>,
    revision: AtomicU64,
}

impl MemoryDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::with_text("")
    }

    /// Create a document with initial text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: RwLock::new(text.into()),
            selection: RwLock::new(Selection::default()),
            revision: AtomicU64::new(0),
        }
    }

    /// Set the selection, clamping it to the document length.
    pub fn set_selection(&self, selection: Selection) {
        let len = self.text.read().chars().count();
        let clamped = Selection::new(selection.from.min(len), selection.to.min(len));
        *self.selection.write() = clamped;
    }

    /// Select the entire document.
    pub fn select_all(&self) {
        let len = self.text.read().chars().count();
        *self.selection.write() = Selection::new(0, len);
    }

    /// Document length in chars.
    pub fn len(&self) -> usize {
        self.text.read().chars().count()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.text.read().is_empty()
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("len", &self.len())
            .field("selection", &*self.selection.read())
            .field("revision", &self.revision())
            .finish()
    }
}

impl DocumentView for MemoryDocument {
    fn selection(&self) -> Selection {
        *self.selection.read()
    }

    fn text_between(&self, from: usize, to: usize) -> DocumentResult<String> {
        let text = self.text.read();
        let (start, end) = char_span_to_byte_span(&text, from, to)?;
        Ok(text[start..end].to_string())
    }

    fn replace_range(&self, from: usize, to: usize, replacement: &str) -> DocumentResult<()> {
        let mut text = self.text.write();
        let (start, end) = char_span_to_byte_span(&text, from, to)?;
        text.replace_range(start..end, replacement);
        let len = text.chars().count();
        drop(text);

        self.revision.fetch_add(1, Ordering::SeqCst);

        // Keep the stored selection inside the new bounds.
        let mut selection = self.selection.write();
        *selection = Selection::new(selection.from.min(len), selection.to.min(len));
        Ok(())
    }

    fn export_text(&self) -> String {
        self.text.read().clone()
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

/// Translate a char-offset span into a byte-offset span.
fn char_span_to_byte_span(text: &str, from: usize, to: usize) -> DocumentResult<(usize, usize)> {
    if from > to {
        return Err(DocumentError::InvalidRange { from, to });
    }

    let out_of_bounds = || DocumentError::RangeOutOfBounds {
        from,
        to,
        len: text.chars().count(),
    };

    let start = byte_offset_at(text, from).ok_or_else(out_of_bounds)?;
    let end = byte_offset_at(text, to).ok_or_else(out_of_bounds)?;
    Ok((start, end))
}

/// Byte offset of the given char offset, `text.len()` for one-past-the-end.
fn byte_offset_at(text: &str, char_offset: usize) -> Option<usize> {
    let mut seen = 0;
    for (byte_idx, _) in text.char_indices() {
        if seen == char_offset {
            return Some(byte_idx);
        }
        seen += 1;
    }
    (char_offset == seen).then_some(text.len())
}
