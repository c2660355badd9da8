//! Data model: conversation messages, session tokens, wire payloads, and the
//! per-send [`Exchange`] record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StreamError;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One finalized message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a user message stamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Create an assistant message stamped now.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Ordered message history for one session, held in process memory only.
///
/// Owned by the session that created it; only the exchange holding the
/// current epoch appends, so there is a single writer by construction.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl ConversationState {
    /// Create an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized message.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// The messages in order of arrival.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop all messages (a fresh session starts clean).
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Opaque session identifier issued by the backend.
///
/// The token has no lifecycle of its own here; creating and destroying
/// sessions is the backend's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response payload of `POST /chat/session`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionCreated {
    pub session_token: SessionToken,
}

/// Request payload of `POST /chat/session/{token}/message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendMessageRequest {
    pub message: String,
}

impl SendMessageRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Lifecycle of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStatus {
    /// Created, stream not yet opened.
    Pending,
    /// Chunks are being consumed.
    Streaming,
    /// Finished with its full content.
    Complete,
    /// Ended with an error; partial content is retained.
    Failed,
}

impl ExchangeStatus {
    /// Whether the exchange can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeStatus::Complete | ExchangeStatus::Failed)
    }
}

/// One request/response streaming interaction: a single chat turn or a
/// single generation call.
///
/// Mutated only by the streaming engine while in flight; immutable once
/// `Complete` or `Failed`.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Stable identifier for correlating snapshots and logs.
    pub id: Uuid,
    /// Outgoing message text; `None` for endpoints that take no body.
    pub prompt: Option<String>,
    /// Accumulated content; partial when the exchange failed mid-stream.
    pub content: String,
    pub status: ExchangeStatus,
    /// Why the exchange failed, when it did.
    pub error: Option<StreamError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Exchange {
    pub(crate) fn new(prompt: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt,
            content: String::new(),
            status: ExchangeStatus::Pending,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn mark_streaming(&mut self) {
        self.status = ExchangeStatus::Streaming;
    }

    pub(crate) fn complete(&mut self, content: String) {
        self.content = content;
        self.status = ExchangeStatus::Complete;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, partial_content: String, error: StreamError) {
        self.content = partial_content;
        self.status = ExchangeStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        self.status == ExchangeStatus::Complete
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExchangeStatus::Failed
    }
}
