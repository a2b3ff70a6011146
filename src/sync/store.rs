// In-memory message store for the open conversation.
// Pure reducers, no transport or I/O: history loads, live inserts, receipts
// and deletions are all plain method calls, so the merge logic can be tested
// without a server on either channel.

use crate::models::{Message, MessageStatus};

/// The ordered message list the conversation view renders. Unique by id,
/// most recent first; `created_at` descending at all times, with arrival
/// order breaking ties between equal timestamps.
pub struct MessageStore {
    conversation_id: String,
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Render order: most recent first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Replace the store contents with a history page as returned by the
    /// API (chronological order), reversed into render order.
    pub fn load_history(&mut self, history: Vec<Message>) {
        self.messages = history;
        self.messages.reverse();
    }

    /// Insert a message unless its id is already present, and report whether
    /// the store changed. Duplicate delivery is expected (network retries),
    /// so a duplicate is a no-op, not an error. The insertion position keeps
    /// `created_at` descending; a message equal-timestamped with existing
    /// ones goes in front of them (arrival order).
    pub fn insert(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        let at = self
            .messages
            .iter()
            .position(|m| m.created_at <= message.created_at)
            .unwrap_or(self.messages.len());
        self.messages.insert(at, message);
        true
    }

    /// Promote every listed message to `read`. Monotonic and idempotent:
    /// already-read messages and unknown ids are untouched. Returns how many
    /// messages actually changed.
    pub fn apply_read(&mut self, ids: &[String]) -> usize {
        let mut changed = 0;
        for message in &mut self.messages {
            if message.status < MessageStatus::Read && ids.iter().any(|id| *id == message.id) {
                message.status = MessageStatus::Read;
                changed += 1;
            }
        }
        changed
    }

    /// Remove a message by id. Absent ids are a no-op: deletions race with
    /// receipts across two channels, so addressing a message that is already
    /// gone is expected.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    /// Ids of messages authored by `peer_id` that have not been read yet:
    /// the batch read receipt emitted right after a history load.
    pub fn unread_from(&self, peer_id: &str) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.sender.id == peer_id && m.status < MessageStatus::Read)
            .map(|m| m.id.clone())
            .collect()
    }
}
