use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::instrument;

use tether_core::ids::{AgentId, SessionId};
use tether_core::message::ChatMessage;
use tether_core::session::Session;

use crate::backend::Backend;
use crate::error::ApiError;
use crate::types::{AgentProfile, FeedbackUpsert, SendMessageRequest, SendMessageResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// JSON client over the chat backend's REST surface.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body));
        }
        response.json::<T>().await.map_err(ApiError::from)
    }

    async fn expect_success(response: reqwest::Response) -> Result<(), ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip(self))]
    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        let response = self.client.get(self.url("/api/sessions")).send().await?;
        Self::decode(response).await
    }

    #[instrument(skip(self))]
    async fn create_session(&self, agent_id: Option<&AgentId>) -> Result<Session, ApiError> {
        let body = serde_json::json!({ "agent_id": agent_id });
        let response = self
            .client
            .post(self.url("/api/sessions"))
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn get_session(&self, id: &SessionId) -> Result<Session, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/sessions/{id}")))
            .send()
            .await?;
        Self::decode(response).await
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn delete_session(&self, id: &SessionId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/sessions/{id}")))
            .send()
            .await?;
        Self::expect_success(response).await
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn list_messages(&self, id: &SessionId) -> Result<Vec<ChatMessage>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/sessions/{id}/messages")))
            .send()
            .await?;
        Self::decode(response).await
    }

    #[instrument(skip(self, request), fields(session_id = %session_id, message_id = %request.id))]
    async fn send_message(
        &self,
        session_id: &SessionId,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/api/sessions/{session_id}/messages")))
            .json(&request)
            .send()
            .await?;
        Self::decode(response).await
    }

    #[instrument(skip(self, request), fields(message_id = %request.message_id))]
    async fn upsert_feedback(&self, request: FeedbackUpsert) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/api/feedback"))
            .json(&request)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    #[instrument(skip(self))]
    async fn list_agents(&self) -> Result<Vec<AgentProfile>, ApiError> {
        let response = self.client.get(self.url("/api/agents")).send().await?;
        Self::decode(response).await
    }
}
