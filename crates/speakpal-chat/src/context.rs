//! Conversation log: the ordered, append-only list of messages.

use speakpal_core::types::{Message, MessageId, Role};

/// Append-only message list with monotonic ids.
///
/// Messages are never edited or removed once appended, and ids are handed
/// out in creation order starting at 1.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    next_id: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// Log seeded with a single assistant message.
    pub fn with_greeting(greeting: &str) -> Self {
        let mut log = Self::new();
        log.append(Role::Assistant, greeting);
        log
    }

    /// Append a message stamped with the current time and return a copy.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Message {
        // `Default` leaves next_id at 0; ids start at 1 either way.
        let id = MessageId(self.next_id.max(1));
        self.next_id = id.0 + 1;

        let message = Message::new(id, role, content);
        tracing::debug!(message_id = %id, role = %role, "Message appended");
        self.messages.push(message.clone());
        message
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        // Ids are sorted, so a binary search suffices.
        self.messages
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|i| &self.messages[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Assistant messages in log order.
    pub fn assistant_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_assistant())
    }
}
