//! Conversation history storage
//!
//! Stores the messages of one session with timestamps

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
        }
    }
}

/// Conversation history for a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: VecDeque<ConversationMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            messages: VecDeque::new(),
        }
    }

    pub fn add_message(&mut self, message: ConversationMessage) {
        self.updated_at = message.timestamp;
        self.messages.push_back(message);
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.add_message(ConversationMessage::new(MessageRole::User, content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.add_message(ConversationMessage::new(MessageRole::Assistant, content));
    }

    pub fn messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter()
    }

    /// The `count` most recent messages, oldest first
    pub fn recent_messages(&self, count: usize) -> impl Iterator<Item = &ConversationMessage> {
        let skip = self.messages.len().saturating_sub(count);
        self.messages.iter().skip(skip)
    }

    pub fn user_messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter().filter(|m| m.role == MessageRole::User)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Time between the first and the last message
    pub fn duration(&self) -> Duration {
        match (self.messages.front(), self.messages.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => Duration::zero(),
        }
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}
