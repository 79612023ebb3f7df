use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, MessageId, SessionId};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Error,
}

impl DeliveryStatus {
    /// A message that has been dispatched but not yet confirmed by a
    /// completion or error signal.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Sending | Self::Sent)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    ThumbsUp,
    ThumbsDown,
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ThumbsUp => write!(f, "thumbs_up"),
            Self::ThumbsDown => write!(f, "thumbs_down"),
        }
    }
}

/// One transcript entry. Identity is the client-generated `id`, assigned
/// before any network round trip, so the optimistic entry and the
/// server-confirmed record converge into a single message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub sender: Sender,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatMessage {
    /// An optimistic user message, inserted before any send attempt.
    pub fn user(session_id: SessionId, id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            session_id,
            sender: Sender::User,
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            status: DeliveryStatus::Sending,
            is_streaming: false,
            sequence: None,
            agent_id: None,
            agent_name: None,
            feedback: None,
            error: None,
        }
    }

    /// An assistant message created from the first streamed chunk.
    pub fn streamed(
        session_id: SessionId,
        id: MessageId,
        chunk: impl Into<String>,
        agent_id: Option<AgentId>,
        agent_name: Option<String>,
    ) -> Self {
        Self {
            id,
            session_id,
            sender: Sender::Agent,
            role: Role::Assistant,
            content: chunk.into(),
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
            is_streaming: true,
            sequence: None,
            agent_id,
            agent_name,
            feedback: None,
            error: None,
        }
    }

    /// Shallow merge of another record for the same id: scalar fields are
    /// overwritten, optional fields only when the incoming record carries
    /// them. Wire payloads omit fields they do not know about, so absent
    /// optionals must not clobber locally-held state (e.g. feedback).
    pub fn merge_from(&mut self, other: &ChatMessage) {
        debug_assert_eq!(self.id, other.id);
        self.session_id = other.session_id.clone();
        self.sender = other.sender;
        self.role = other.role;
        self.content = other.content.clone();
        self.created_at = other.created_at;
        self.status = other.status;
        self.is_streaming = other.is_streaming;
        if other.sequence.is_some() {
            self.sequence = other.sequence;
        }
        if other.agent_id.is_some() {
            self.agent_id = other.agent_id.clone();
        }
        if other.agent_name.is_some() {
            self.agent_name = other.agent_name.clone();
        }
        if other.feedback.is_some() {
            self.feedback = other.feedback;
        }
        if other.error.is_some() {
            self.error = other.error.clone();
        }
    }
}
