//! Message model representing a mirrored inbox message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local mirror of a single inbox message
///
/// Header fields are stored as the raw header values. Only `is_starred`
/// changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Gmail message ID
    pub id: MessageId,
    /// Subject header
    pub subject: String,
    /// From header
    pub sender: String,
    /// To header
    pub recipient: String,
    /// Parsed Date header, or the time the message was processed
    pub received_at: DateTime<Utc>,
    /// Gmail's plain-text snippet of the body
    pub snippet: String,
    /// Whether the message carries the STARRED label
    pub is_starred: bool,
}

impl Message {
    /// Create a new message builder
    pub fn builder(id: MessageId) -> MessageBuilder {
        MessageBuilder::new(id)
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    id: MessageId,
    subject: String,
    sender: String,
    recipient: String,
    received_at: Option<DateTime<Utc>>,
    snippet: String,
    is_starred: bool,
}

impl MessageBuilder {
    fn new(id: MessageId) -> Self {
        Self {
            id,
            subject: String::new(),
            sender: String::new(),
            recipient: String::new(),
            received_at: None,
            snippet: String::new(),
            is_starred: false,
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn starred(mut self, is_starred: bool) -> Self {
        self.is_starred = is_starred;
        self
    }

    pub fn build(self) -> Message {
        Message {
            id: self.id,
            subject: self.subject,
            sender: self.sender,
            recipient: self.recipient,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            snippet: self.snippet,
            is_starred: self.is_starred,
        }
    }
}
