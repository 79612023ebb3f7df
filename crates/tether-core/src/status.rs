use serde::{Deserialize, Serialize};

/// Connection state of the realtime channel. One value per client process.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Whether an agent is composing a response, and which one.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingState {
    pub is_typing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

impl TypingState {
    pub fn started(agent_name: Option<String>) -> Self {
        Self {
            is_typing: true,
            agent_name,
        }
    }

    pub fn clear(&mut self) {
        self.is_typing = false;
        self.agent_name = None;
    }
}

/// The single current-error slot. A new notice replaces the old one, so the
/// surface always shows the most recent condition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
    pub recoverable: bool,
}

impl ErrorNotice {
    pub fn new(code: impl Into<String>, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recoverable,
        }
    }
}
