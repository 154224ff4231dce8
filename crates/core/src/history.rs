//! The append-only conversation history store.
//!
//! Messages carry their position as their `id`; every mutation renumbers
//! the whole sequence so ids stay contiguous `0..n-1`. Renumbering is a
//! full pass over the sequence, which compaction keeps short.
//!
//! Unbounded growth would exceed backend context limits, so `compact`
//! collapses older messages behind a synthetic summary marker. The
//! collapsed range is lost; only its summary remains.
//!
//! A `History` is owned by exactly one active loop at a time. External
//! readers get cloned snapshots; nothing here is safe for concurrent
//! mutation from two loops.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{HistoryError, Result};
use crate::message::{Message, MessageFlag};

/// Produces a summary message for a range of compacted history.
///
/// Typically backed by another backend round trip; the store never cares
/// how the text is produced.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize the given messages into a short plain-text digest.
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

/// An ordered, append-only sequence of messages with positional ids.
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history from a caller-supplied seed, renumbering it.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut history = Self { messages };
        history.renumber();
        history
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// All messages, in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Insert at the tail, assigning `id = length before insertion`.
    pub fn append(&mut self, mut message: Message) {
        message.id = self.messages.len();
        self.messages.push(message);
    }

    /// Insert at `index`, shifting subsequent messages and renumbering.
    ///
    /// Fails with an out-of-range error unless `0 <= index <= len`,
    /// leaving the history untouched on failure.
    pub fn insert(&mut self, message: Message, index: usize) -> Result<()> {
        if index > self.messages.len() {
            return Err(HistoryError::IndexOutOfRange {
                index,
                len: self.messages.len(),
            }
            .into());
        }
        self.messages.insert(index, message);
        self.renumber();
        Ok(())
    }

    /// Position of the most recent summary marker, if any.
    pub fn last_summary_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|m| m.has_flag(MessageFlag::IsSummary))
    }

    /// The live context window: everything from the most recent summary
    /// marker forward (summary included — it carries the collapsed
    /// context), or the whole history if no summary exists.
    pub fn live_window(&self) -> &[Message] {
        match self.last_summary_index() {
            Some(idx) => &self.messages[idx..],
            None => &self.messages[..],
        }
    }

    /// Number of messages strictly after the most recent summary marker.
    pub fn len_since_summary(&self) -> usize {
        match self.last_summary_index() {
            Some(idx) => self.messages.len() - idx - 1,
            None => self.messages.len(),
        }
    }

    /// Collapse the oldest `reduce_by` post-summary messages behind a
    /// synthetic summary marker, when more than `threshold` messages have
    /// accumulated since the last one.
    ///
    /// The summarizer runs before any mutation, so an abandoned call never
    /// leaves the store partially renumbered. Idempotent once the live
    /// count is back under the threshold.
    pub async fn compact(
        &mut self,
        threshold: usize,
        reduce_by: usize,
        summarizer: &dyn Summarizer,
    ) -> Result<()> {
        let start = self.last_summary_index().map_or(0, |idx| idx + 1);
        let live = self.messages.len() - start;
        if live <= threshold || reduce_by == 0 {
            return Ok(());
        }

        let take = reduce_by.min(live);
        let compacted = &self.messages[start..start + take];
        let summary_text = summarizer.summarize(compacted).await?;

        let marker = Message::system(format!(
            "Summary of earlier conversation:\n{summary_text}"
        ))
        .with_flag(MessageFlag::IsSummary);

        // Splice and renumber in one synchronous mutation.
        self.messages
            .splice(start..start + take, std::iter::once(marker));
        self.renumber();

        debug!(
            replaced = take,
            live = self.len_since_summary(),
            "compacted history behind summary marker"
        );
        Ok(())
    }

    fn renumber(&mut self) {
        for (idx, message) in self.messages.iter_mut().enumerate() {
            message.id = idx;
        }
    }
}
