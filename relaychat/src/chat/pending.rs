//! Outgoing messages awaiting a relay acknowledgment.
//!
//! The relay acknowledges by echoing the message text, with no message ID.
//! Entries are therefore keyed by text. Identical texts in flight at the
//! same time queue behind one key and are resolved oldest first, which
//! matches the relay's in-order handling of a single connection. An ack
//! still cannot be tied to one specific send.

use std::collections::{HashMap, VecDeque};

use relaychat_proto::envelope::MessageId;

/// One outgoing message awaiting acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEntry {
    /// Local identifier assigned at send time.
    pub id: MessageId,
    /// Index of the message in the transcript.
    pub entry: usize,
}

/// Pending outgoing messages keyed by text.
#[derive(Debug, Default)]
pub struct PendingTable {
    by_text: HashMap<String, VecDeque<PendingEntry>>,
}

impl PendingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `text` as awaiting acknowledgment.
    pub fn insert(&mut self, text: impl Into<String>, pending: PendingEntry) {
        self.by_text.entry(text.into()).or_default().push_back(pending);
    }

    /// Resolve the oldest pending entry for `text`.
    ///
    /// Returns `None` if `text` is not pending. The key disappears once
    /// its last entry is resolved.
    pub fn acknowledge(&mut self, text: &str) -> Option<PendingEntry> {
        let queue = self.by_text.get_mut(text)?;
        let resolved = queue.pop_front();
        if queue.is_empty() {
            self.by_text.remove(text);
        }
        resolved
    }

    /// Whether `text` has at least one pending entry.
    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.by_text.contains_key(text)
    }

    /// Pending entries for `text`, oldest first.
    #[must_use]
    pub fn entries_for(&self, text: &str) -> Vec<PendingEntry> {
        self.by_text
            .get(text)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of distinct pending texts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_text.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_text.is_empty()
    }

    /// Drop every entry. Returns how many were abandoned.
    pub fn abandon_all(&mut self) -> usize {
        let abandoned = self.by_text.values().map(VecDeque::len).sum();
        self.by_text.clear();
        abandoned
    }
}
