use serde::{Deserialize, Serialize};

use tether_core::ids::{AgentId, MessageId, SessionId};
use tether_core::message::{ChatMessage, Feedback};
use tether_core::session::Session;

/// Body of the fallback send call. The client-generated message id rides
/// along so the backend stores the same identity the optimistic entry uses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub id: MessageId,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The fallback send returns the refreshed session summary plus both stored
/// message records, so one response reconciles everything the optimistic
/// path guessed at.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub session: Session,
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
}

/// Idempotent per message id: repeating the call with the same message id
/// overwrites the previous rating.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackUpsert {
    pub session_id: SessionId,
    pub message_id: MessageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_type: Option<Feedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
}

impl FeedbackUpsert {
    pub fn new(
        session_id: SessionId,
        message_id: MessageId,
        agent_id: Option<AgentId>,
        feedback: Option<Feedback>,
    ) -> Self {
        let rating = feedback.map(|f| match f {
            Feedback::ThumbsUp => 1,
            Feedback::ThumbsDown => -1,
        });
        Self {
            session_id,
            message_id,
            agent_id,
            feedback_type: feedback,
            rating,
        }
    }
}

/// Roster entry used only to populate agent selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
