use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, SessionId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Archived,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// A chat session summary. Preview fields (`last_message`, `last_message_at`,
/// `message_count`) are re-derived whenever a message lands in the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_agent_id: Option<AgentId>,
    #[serde(default)]
    pub message_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            title: None,
            status: SessionStatus::Active,
            selected_agent_id: None,
            message_count: 0,
            last_message: None,
            last_message_at: None,
            updated_at: None,
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_agent(agent_id: AgentId) -> Self {
        let mut session = Self::new();
        session.selected_agent_id = Some(agent_id);
        session
    }

    /// The timestamp sessions are ordered by for display:
    /// `last_message_at`, else `updated_at`, else `created_at`.
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.last_message_at
            .or(self.updated_at)
            .unwrap_or(self.created_at)
    }

    /// Refresh preview fields after a message landed. `message_count` only
    /// ever grows; the floor guards against a stale count from a partial
    /// message list.
    pub fn record_message(&mut self, preview: &str, at: DateTime<Utc>, count_floor: u32) {
        self.last_message = Some(preview.to_string());
        self.last_message_at = Some(at);
        self.updated_at = Some(at);
        self.message_count = self.message_count.max(count_floor);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
