//! Conversation: the ordered, append-only message history.
//!
//! Lives in memory for the life of the process. Only `clear` removes
//! messages; an assistant message is never inserted before the user message
//! that triggered it.

use crate::inference::ModelMessage;

use super::types::Message;

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
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

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// History as the model sees it: role and text only.
    ///
    /// Messages with empty content are left out; providers reject empty turns.
    pub fn to_model_messages(&self) -> Vec<ModelMessage> {
        self.messages
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| ModelMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
