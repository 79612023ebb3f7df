use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use tether_core::ids::{AgentId, MessageId, SessionId};
use tether_core::message::{ChatMessage, DeliveryStatus, Role, Sender};
use tether_core::session::Session;

use crate::backend::Backend;
use crate::error::ApiError;
use crate::types::{AgentProfile, FeedbackUpsert, SendMessageRequest, SendMessageResponse};

/// Deterministic in-memory backend for tests. Behaves like a well-behaved
/// server: echoes the user message under its client-generated id and answers
/// with a canned assistant reply. Individual calls can be made to fail.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    pub send_calls: AtomicUsize,
    pub feedback_calls: AtomicUsize,
    pub get_session_calls: AtomicUsize,
    pub create_session_calls: AtomicUsize,
}

#[derive(Default)]
struct MockState {
    sessions: Vec<Session>,
    messages: HashMap<SessionId, Vec<ChatMessage>>,
    agents: Vec<AgentProfile>,
    fail_list_sessions: bool,
    fail_create_session: bool,
    fail_list_messages: bool,
    fail_send: bool,
    fail_feedback: bool,
    fail_list_agents: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, session: Session) {
        self.state.lock().sessions.push(session);
    }

    pub fn set_messages(&self, session_id: SessionId, messages: Vec<ChatMessage>) {
        self.state.lock().messages.insert(session_id, messages);
    }

    pub fn set_agents(&self, agents: Vec<AgentProfile>) {
        self.state.lock().agents = agents;
    }

    pub fn fail_list_sessions(&self, fail: bool) {
        self.state.lock().fail_list_sessions = fail;
    }

    pub fn fail_create_session(&self, fail: bool) {
        self.state.lock().fail_create_session = fail;
    }

    pub fn fail_list_messages(&self, fail: bool) {
        self.state.lock().fail_list_messages = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().fail_send = fail;
    }

    pub fn fail_feedback(&self, fail: bool) {
        self.state.lock().fail_feedback = fail;
    }

    pub fn fail_list_agents(&self, fail: bool) {
        self.state.lock().fail_list_agents = fail;
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        let state = self.state.lock();
        if state.fail_list_sessions {
            return Err(ApiError::from_status(500, "list_sessions failed".into()));
        }
        Ok(state.sessions.clone())
    }

    async fn create_session(&self, agent_id: Option<&AgentId>) -> Result<Session, ApiError> {
        self.create_session_calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        if state.fail_create_session {
            return Err(ApiError::from_status(500, "create_session failed".into()));
        }
        let session = match agent_id {
            Some(agent) => Session::with_agent(agent.clone()),
            None => Session::new(),
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session, ApiError> {
        self.get_session_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock();
        state
            .sessions
            .iter()
            .find(|s| &s.id == id)
            .cloned()
            .ok_or_else(|| ApiError::from_status(404, format!("session {id} not found")))
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|s| &s.id != id);
        state.messages.remove(id);
        if state.sessions.len() == before {
            return Err(ApiError::from_status(404, format!("session {id} not found")));
        }
        Ok(())
    }

    async fn list_messages(&self, id: &SessionId) -> Result<Vec<ChatMessage>, ApiError> {
        let state = self.state.lock();
        if state.fail_list_messages {
            return Err(ApiError::from_status(500, "list_messages failed".into()));
        }
        Ok(state.messages.get(id).cloned().unwrap_or_default())
    }

    async fn send_message(
        &self,
        session_id: &SessionId,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError> {
        self.send_calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        if state.fail_send {
            return Err(ApiError::from_status(502, "send failed".into()));
        }

        let now = Utc::now();
        let mut user_message = ChatMessage::user(session_id.clone(), request.id, &request.content);
        user_message.status = DeliveryStatus::Delivered;

        let assistant_message = ChatMessage {
            id: MessageId::new(),
            session_id: session_id.clone(),
            sender: Sender::Agent,
            role: Role::Assistant,
            content: format!("echo: {}", request.content),
            created_at: now,
            status: DeliveryStatus::Delivered,
            is_streaming: false,
            sequence: None,
            agent_id: request.agent_id,
            agent_name: None,
            feedback: None,
            error: None,
        };

        let entry = state.messages.entry(session_id.clone()).or_default();
        entry.push(user_message.clone());
        entry.push(assistant_message.clone());
        let count = entry.len() as u32;

        let session = match state.sessions.iter_mut().find(|s| &s.id == session_id) {
            Some(session) => {
                session.record_message(&assistant_message.content, now, count);
                session.clone()
            }
            None => {
                let mut session = Session::new();
                session.id = session_id.clone();
                session.record_message(&assistant_message.content, now, count);
                state.sessions.push(session.clone());
                session
            }
        };

        Ok(SendMessageResponse {
            session,
            user_message,
            assistant_message,
        })
    }

    async fn upsert_feedback(&self, _request: FeedbackUpsert) -> Result<(), ApiError> {
        self.feedback_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock();
        if state.fail_feedback {
            return Err(ApiError::from_status(500, "feedback failed".into()));
        }
        Ok(())
    }

    async fn list_agents(&self) -> Result<Vec<AgentProfile>, ApiError> {
        let state = self.state.lock();
        if state.fail_list_agents {
            return Err(ApiError::from_status(500, "list_agents failed".into()));
        }
        Ok(state.agents.clone())
    }
}
