use crate::status::ErrorNotice;

/// Typed error hierarchy for engine operations. Every failure lands in the
/// error slot as an `ErrorNotice`; `is_recoverable` controls whether the UI
/// offers a retry action or requires explicit resubmission.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EngineError {
    // Transport-level, auto-retried by the channel manager
    #[error("reconnecting, attempt {attempt}")]
    WebsocketReconnect { attempt: u32 },
    #[error("realtime channel error: {0}")]
    WebsocketError(String),
    #[error("realtime message error: {0}")]
    WebsocketMessageError(String),

    // Collaborator-call failures, retried only on explicit user action
    #[error("failed to create session: {0}")]
    SessionCreateFailed(String),
    #[error("failed to load session: {0}")]
    SessionLoadFailed(String),
    #[error("failed to delete session: {0}")]
    SessionDeleteFailed(String),
    #[error("failed to load chat state: {0}")]
    BootstrapFailed(String),
    #[error("failed to load agent roster: {0}")]
    AgentsLoadFailed(String),
    #[error("failed to record feedback: {0}")]
    FeedbackFailed(String),

    // Resubmission mints a new id; never silently resent
    #[error("message send failed: {0}")]
    MessageSendFailed(String),
}

impl EngineError {
    /// Stable code string shown alongside the message in the error slot.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WebsocketReconnect { .. } => "websocket_reconnect",
            Self::WebsocketError(_) => "websocket_error",
            Self::WebsocketMessageError(_) => "websocket_message_error",
            Self::SessionCreateFailed(_) => "session_create_failed",
            Self::SessionLoadFailed(_) => "session_load_failed",
            Self::SessionDeleteFailed(_) => "session_delete_failed",
            Self::BootstrapFailed(_) => "bootstrap_failed",
            Self::AgentsLoadFailed(_) => "agents_load_failed",
            Self::FeedbackFailed(_) => "feedback_failed",
            Self::MessageSendFailed(_) => "message_send_failed",
        }
    }

    /// A failed send must not be retried automatically: resending the same
    /// content risks a duplicate assistant turn. Everything else is safe to
    /// retry, either automatically (transport) or on user action.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MessageSendFailed(_))
    }

    pub fn notice(&self) -> ErrorNotice {
        ErrorNotice::new(self.code(), self.to_string(), self.is_recoverable())
    }
}
