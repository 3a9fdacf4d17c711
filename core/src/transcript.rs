use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Who sent the message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp_secs: u64, // Unix timestamp in seconds
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into())
    }

    fn new(role: MessageRole, content: String) -> Self {
        let timestamp_secs = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0u64, |d| d.as_secs());
        Self {
            role,
            content,
            timestamp_secs,
        }
    }

    /// Format the message for display
    pub fn formatted_content(&self) -> String {
        match self.role {
            MessageRole::User => format!("You: {}", self.content),
            MessageRole::Assistant => format!("Chloe: {}", self.content),
        }
    }
}

/// Append-only record of the conversation, in causal (and display) order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Drop every message. Only the assistant calls this, and only while idle.
    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_keeps_append_order() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user("first"));
        transcript.push(ChatMessage::assistant("second"));

        let messages = transcript.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "second");
    }

    #[test]
    fn test_formatted_content() {
        assert_eq!(ChatMessage::user("hi").formatted_content(), "You: hi");
        assert_eq!(ChatMessage::assistant("hello").formatted_content(), "Chloe: hello");
    }
}
