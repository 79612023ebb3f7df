use std::collections::HashMap;

use chrono::{DateTime, Utc};

use tether_core::ids::{AgentId, MessageId, SessionId};
use tether_core::message::{ChatMessage, DeliveryStatus, Feedback, Sender};

/// Derived preview of a session's ledger, used to refresh the session
/// summary after every mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerPreview {
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: u32,
}

/// Per-session ordered message lists. Messages stay in append/patch order,
/// never re-sorted by timestamp, so the transcript preserves the exact
/// order the user experienced, optimistic entries included.
#[derive(Debug, Default)]
pub struct MessageLedger {
    by_session: HashMap<SessionId, Vec<ChatMessage>>,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale replace, used when a session is (re)loaded.
    pub fn replace(&mut self, session_id: &SessionId, messages: Vec<ChatMessage>) {
        self.by_session.insert(session_id.clone(), messages);
    }

    /// Append an optimistic user message. The entry is forced to `sending`
    /// so the transcript never shows an unconfirmed message as anything else.
    pub fn push_optimistic(&mut self, session_id: &SessionId, mut message: ChatMessage) {
        message.status = DeliveryStatus::Sending;
        self.by_session
            .entry(session_id.clone())
            .or_default()
            .push(message);
    }

    /// Append if the id is unseen, otherwise merge into the existing entry.
    /// Returns true when a new entry was appended.
    pub fn upsert(&mut self, session_id: &SessionId, message: ChatMessage) -> bool {
        let messages = self.by_session.entry(session_id.clone()).or_default();
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                existing.merge_from(&message);
                false
            }
            None => {
                messages.push(message);
                true
            }
        }
    }

    /// Accumulate a streamed chunk. The first chunk creates the message
    /// (`sent`, streaming); later chunks concatenate in arrival order and
    /// refresh agent identity when newly supplied.
    pub fn append_chunk(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
        chunk: &str,
        agent_id: Option<AgentId>,
        agent_name: Option<String>,
    ) {
        let messages = self.by_session.entry(session_id.clone()).or_default();
        match messages.iter_mut().find(|m| m.id == *message_id) {
            Some(existing) => {
                existing.content.push_str(chunk);
                if agent_id.is_some() {
                    existing.agent_id = agent_id;
                }
                if agent_name.is_some() {
                    existing.agent_name = agent_name;
                }
            }
            None => {
                messages.push(ChatMessage::streamed(
                    session_id.clone(),
                    message_id.clone(),
                    chunk,
                    agent_id,
                    agent_name,
                ));
            }
        }
    }

    /// Mark a streaming message complete. No-op for unknown ids; calling it
    /// again on a finished message changes nothing.
    pub fn finalize_stream(&mut self, session_id: &SessionId, message_id: &MessageId) -> bool {
        let Some(message) = self.get_mut(session_id, message_id) else {
            return false;
        };
        message.status = DeliveryStatus::Delivered;
        message.is_streaming = false;
        true
    }

    /// Direct status transition for a known id.
    pub fn mark_status(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> bool {
        let Some(message) = self.get_mut(session_id, message_id) else {
            return false;
        };
        message.status = status;
        if error.is_some() {
            message.error = error;
        }
        true
    }

    /// Transition the most recently dispatched user message still awaiting
    /// confirmation. Scans from the end: completion and error frames carry
    /// no id for the user turn, and the nearest-to-end pending user message
    /// is the one that request belongs to.
    pub fn mark_latest_pending_user(
        &mut self,
        session_id: &SessionId,
        status: DeliveryStatus,
    ) -> Option<MessageId> {
        let messages = self.by_session.get_mut(session_id)?;
        let message = messages
            .iter_mut()
            .rev()
            .find(|m| m.sender == Sender::User && m.status.is_pending())?;
        message.status = status;
        Some(message.id.clone())
    }

    /// Set or clear feedback in place, returning the prior value so a failed
    /// network call can roll it back exactly.
    pub fn set_feedback(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
        feedback: Option<Feedback>,
    ) -> Option<Option<Feedback>> {
        let message = self.get_mut(session_id, message_id)?;
        let prior = message.feedback;
        message.feedback = feedback;
        Some(prior)
    }

    pub fn remove_session(&mut self, session_id: &SessionId) -> bool {
        self.by_session.remove(session_id).is_some()
    }

    pub fn messages(&self, session_id: &SessionId) -> &[ChatMessage] {
        self.by_session
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains_session(&self, session_id: &SessionId) -> bool {
        self.by_session.contains_key(session_id)
    }

    /// Preview fields derived from the current ledger state.
    pub fn preview(&self, session_id: &SessionId) -> LedgerPreview {
        let messages = self.messages(session_id);
        let last = messages.last();
        LedgerPreview {
            last_message: last.map(|m| m.content.clone()),
            last_message_at: last.map(|m| m.created_at),
            message_count: messages.len() as u32,
        }
    }

    fn get_mut(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
    ) -> Option<&mut ChatMessage> {
        self.by_session
            .get_mut(session_id)?
            .iter_mut()
            .find(|m| m.id == *message_id)
    }
}
