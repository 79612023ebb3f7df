use async_trait::async_trait;

use tether_core::ids::{AgentId, SessionId};
use tether_core::message::ChatMessage;
use tether_core::session::Session;

use crate::error::ApiError;
use crate::types::{AgentProfile, FeedbackUpsert, SendMessageRequest, SendMessageResponse};

/// The request/response collaborator: session CRUD, the fallback send path,
/// feedback upsert and the agent roster. The engine only talks to this
/// trait; production uses `HttpBackend`, tests use `MockBackend`.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError>;

    async fn create_session(&self, agent_id: Option<&AgentId>) -> Result<Session, ApiError>;

    async fn get_session(&self, id: &SessionId) -> Result<Session, ApiError>;

    async fn delete_session(&self, id: &SessionId) -> Result<(), ApiError>;

    async fn list_messages(&self, id: &SessionId) -> Result<Vec<ChatMessage>, ApiError>;

    /// Single-shot send. No retries at this layer: a retry is an explicit
    /// caller action, under a fresh message id.
    async fn send_message(
        &self,
        session_id: &SessionId,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError>;

    async fn upsert_feedback(&self, request: FeedbackUpsert) -> Result<(), ApiError>;

    async fn list_agents(&self) -> Result<Vec<AgentProfile>, ApiError>;
}
