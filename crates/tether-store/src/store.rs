use tether_core::errors::EngineError;
use tether_core::ids::{AgentId, MessageId, SessionId};
use tether_core::message::{ChatMessage, DeliveryStatus, Feedback};
use tether_core::session::Session;
use tether_core::status::{ConnectionStatus, ErrorNotice, TypingState};

use crate::ledger::MessageLedger;
use crate::registry::SessionRegistry;

/// The engine's single state container: session registry, message ledger,
/// typing/connection/error surface and the active-stream marker. Owned by
/// the application and injected into every component; there is no global.
///
/// All mutation is synchronous and runs to completion; concurrency is the
/// caller's concern (the engine serializes access behind one lock). Every
/// ledger mutation re-derives the owning session's preview and re-sorts the
/// registry, so session-list order always reflects ledger state.
#[derive(Debug, Default)]
pub struct ChatStore {
    registry: SessionRegistry,
    ledger: MessageLedger,
    typing: TypingState,
    connection: ConnectionStatus,
    reconnect_attempt: u32,
    active_stream: Option<SessionId>,
    last_error: Option<ErrorNotice>,
    bootstrapping: bool,
    session_loading: bool,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Session registry ---

    pub fn set_sessions(&mut self, sessions: Vec<Session>) {
        self.registry.set_sessions(sessions);
    }

    pub fn upsert_session(&mut self, session: Session) {
        self.registry.upsert(session);
    }

    /// Delete a session and its ledger. If it was active, the next-newest
    /// session becomes active and the agent selection follows it.
    pub fn remove_session(&mut self, id: &SessionId) -> bool {
        let removed = self.registry.remove(id);
        self.ledger.remove_session(id);
        if self.active_stream.as_ref() == Some(id) {
            self.active_stream = None;
        }
        removed
    }

    pub fn set_current_session(&mut self, id: SessionId) {
        self.registry.set_current(id);
    }

    pub fn set_selected_agent(&mut self, agent: Option<AgentId>) {
        self.registry.set_selected_agent(agent);
    }

    pub fn sessions(&self) -> &[Session] {
        self.registry.sessions()
    }

    pub fn current_session_id(&self) -> Option<&SessionId> {
        self.registry.current_id()
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.registry.current()
    }

    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.registry.get(id)
    }

    pub fn selected_agent(&self) -> Option<&AgentId> {
        self.registry.selected_agent()
    }

    // --- Message ledger ---

    pub fn replace_messages(&mut self, session_id: &SessionId, messages: Vec<ChatMessage>) {
        self.ledger.replace(session_id, messages);
        self.refresh_preview(session_id);
    }

    /// Insert the optimistic echo before any send attempt, so there is never
    /// a gap between the user's action and a visible message.
    pub fn add_optimistic_user_message(&mut self, message: ChatMessage) {
        let session_id = message.session_id.clone();
        self.ledger.push_optimistic(&session_id, message);
        self.refresh_preview(&session_id);
    }

    pub fn upsert_message(&mut self, message: ChatMessage) {
        let session_id = message.session_id.clone();
        self.ledger.upsert(&session_id, message);
        self.refresh_preview(&session_id);
    }

    pub fn append_stream_chunk(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
        chunk: &str,
        agent_id: Option<AgentId>,
        agent_name: Option<String>,
    ) {
        self.ledger
            .append_chunk(session_id, message_id, chunk, agent_id, agent_name);
        self.refresh_preview(session_id);
    }

    pub fn finalize_stream_message(&mut self, session_id: &SessionId, message_id: &MessageId) {
        if self.ledger.finalize_stream(session_id, message_id) {
            self.refresh_preview(session_id);
        }
    }

    pub fn mark_message_status(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
        status: DeliveryStatus,
        error: Option<String>,
    ) {
        if self.ledger.mark_status(session_id, message_id, status, error) {
            self.refresh_preview(session_id);
        }
    }

    pub fn mark_latest_pending_user_message(
        &mut self,
        session_id: &SessionId,
        status: DeliveryStatus,
    ) -> Option<MessageId> {
        let marked = self.ledger.mark_latest_pending_user(session_id, status);
        if marked.is_some() {
            self.refresh_preview(session_id);
        }
        marked
    }

    /// Set or clear feedback, returning the prior value for rollback.
    pub fn apply_feedback(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
        feedback: Option<Feedback>,
    ) -> Option<Option<Feedback>> {
        self.ledger.set_feedback(session_id, message_id, feedback)
    }

    pub fn messages(&self, session_id: &SessionId) -> &[ChatMessage] {
        self.ledger.messages(session_id)
    }

    pub fn has_messages_loaded(&self, session_id: &SessionId) -> bool {
        self.ledger.contains_session(session_id)
    }

    // --- Typing ---

    pub fn set_typing(&mut self, agent_name: Option<String>) {
        self.typing = TypingState::started(agent_name);
    }

    pub fn clear_typing(&mut self) {
        self.typing.clear();
    }

    pub fn typing(&self) -> &TypingState {
        &self.typing
    }

    // --- Connection state ---

    pub fn set_connection_status(&mut self, status: ConnectionStatus) {
        self.connection = status;
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection
    }

    /// Bump the reconnect counter and return the new attempt number.
    pub fn begin_reconnect_attempt(&mut self) -> u32 {
        self.reconnect_attempt += 1;
        self.reconnect_attempt
    }

    /// Only a successful connect resets the counter.
    pub fn reset_reconnect_attempts(&mut self) {
        self.reconnect_attempt = 0;
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    // --- Active stream marker ---

    pub fn set_active_stream(&mut self, session_id: Option<SessionId>) {
        self.active_stream = session_id;
    }

    pub fn active_stream(&self) -> Option<&SessionId> {
        self.active_stream.as_ref()
    }

    // --- Error slot & loading flags ---

    pub fn report_error(&mut self, error: &EngineError) {
        tracing::debug!(code = error.code(), "error surfaced: {error}");
        self.last_error = Some(error.notice());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn last_error(&self) -> Option<&ErrorNotice> {
        self.last_error.as_ref()
    }

    pub fn set_bootstrapping(&mut self, value: bool) {
        self.bootstrapping = value;
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.bootstrapping
    }

    pub fn set_session_loading(&mut self, value: bool) {
        self.session_loading = value;
    }

    pub fn is_session_loading(&self) -> bool {
        self.session_loading
    }

    fn refresh_preview(&mut self, session_id: &SessionId) {
        let preview = self.ledger.preview(session_id);
        if let Some(session) = self.registry.get_mut(session_id) {
            match (preview.last_message.as_deref(), preview.last_message_at) {
                (Some(text), Some(at)) => {
                    session.record_message(text, at, preview.message_count)
                }
                _ => {
                    session.last_message = None;
                    session.last_message_at = None;
                }
            }
        }
        self.registry.resort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn session_at(secs: i64) -> Session {
        let mut s = Session::new();
        s.created_at = Utc.timestamp_opt(secs, 0).unwrap();
        s
    }

    #[test]
    fn optimistic_then_upsert_keeps_single_entry() {
        let mut store = ChatStore::new();
        let session = session_at(100);
        let sid = session.id.clone();
        store.set_sessions(vec![session]);

        let mid = MessageId::new();
        store.add_optimistic_user_message(ChatMessage::user(sid.clone(), mid.clone(), "hi"));
        assert_eq!(store.messages(&sid).len(), 1);

        let mut confirmed = ChatMessage::user(sid.clone(), mid, "hi");
        confirmed.status = DeliveryStatus::Delivered;
        store.upsert_message(confirmed);

        assert_eq!(store.messages(&sid).len(), 1);
        assert_eq!(store.messages(&sid)[0].status, DeliveryStatus::Delivered);
    }

    #[test]
    fn message_landing_refreshes_preview_and_reorders() {
        let mut store = ChatStore::new();
        let newer = session_at(200);
        let older = session_at(100);
        let older_id = older.id.clone();
        store.set_sessions(vec![older, newer.clone()]);
        assert_eq!(store.sessions()[0].id, newer.id);

        store.add_optimistic_user_message(ChatMessage::user(
            older_id.clone(),
            MessageId::new(),
            "bumped",
        ));

        // The session that just received a message sorts first now.
        assert_eq!(store.sessions()[0].id, older_id);
        let bumped = store.session(&older_id).unwrap();
        assert_eq!(bumped.last_message.as_deref(), Some("bumped"));
        assert_eq!(bumped.message_count, 1);
    }

    #[test]
    fn replace_messages_recomputes_preview() {
        let mut store = ChatStore::new();
        let session = session_at(100);
        let sid = session.id.clone();
        store.set_sessions(vec![session]);

        let msgs = vec![
            ChatMessage::user(sid.clone(), MessageId::new(), "one"),
            ChatMessage::user(sid.clone(), MessageId::new(), "two"),
        ];
        store.replace_messages(&sid, msgs);

        let session = store.session(&sid).unwrap();
        assert_eq!(session.last_message.as_deref(), Some("two"));
        assert_eq!(session.message_count, 2);
    }

    #[test]
    fn replace_with_empty_clears_preview_but_keeps_count_floor() {
        let mut store = ChatStore::new();
        let mut session = session_at(100);
        session.message_count = 5;
        let sid = session.id.clone();
        store.set_sessions(vec![session]);

        store.replace_messages(&sid, vec![]);
        let session = store.session(&sid).unwrap();
        assert!(session.last_message.is_none());
        assert!(session.last_message_at.is_none());
        assert_eq!(session.message_count, 5);
    }

    #[test]
    fn deleting_active_session_promotes_and_cascades() {
        let mut store = ChatStore::new();
        let a = session_at(200);
        let b = session_at(100);
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        store.set_sessions(vec![a, b]);
        assert_eq!(store.current_session_id(), Some(&a_id));

        store.add_optimistic_user_message(ChatMessage::user(a_id.clone(), MessageId::new(), "x"));

        assert!(store.remove_session(&a_id));
        assert_eq!(store.current_session_id(), Some(&b_id));
        assert!(!store.has_messages_loaded(&a_id));
        assert!(store.messages(&a_id).is_empty());
    }

    #[test]
    fn removing_marked_session_clears_active_stream() {
        let mut store = ChatStore::new();
        let session = session_at(100);
        let sid = session.id.clone();
        store.set_sessions(vec![session]);
        store.set_active_stream(Some(sid.clone()));

        store.remove_session(&sid);
        assert!(store.active_stream().is_none());
    }

    #[test]
    fn error_slot_keeps_latest_only() {
        let mut store = ChatStore::new();
        store.report_error(&EngineError::BootstrapFailed("first".into()));
        store.report_error(&EngineError::MessageSendFailed("second".into()));

        let notice = store.last_error().unwrap();
        assert_eq!(notice.code, "message_send_failed");
        assert!(notice.message.contains("second"));
        assert!(!notice.recoverable);

        store.clear_error();
        assert!(store.last_error().is_none());
    }

    #[test]
    fn reconnect_counter_resets_only_explicitly() {
        let mut store = ChatStore::new();
        assert_eq!(store.begin_reconnect_attempt(), 1);
        assert_eq!(store.begin_reconnect_attempt(), 2);
        assert_eq!(store.begin_reconnect_attempt(), 3);
        store.set_connection_status(ConnectionStatus::Error);
        assert_eq!(store.reconnect_attempt(), 3);

        store.reset_reconnect_attempts();
        assert_eq!(store.reconnect_attempt(), 0);
    }

    #[test]
    fn typing_lifecycle() {
        let mut store = ChatStore::new();
        store.set_typing(Some("Atlas".into()));
        assert!(store.typing().is_typing);
        assert_eq!(store.typing().agent_name.as_deref(), Some("Atlas"));

        store.clear_typing();
        assert!(!store.typing().is_typing);
        assert!(store.typing().agent_name.is_none());
    }

    #[test]
    fn feedback_roundtrip_through_store() {
        let mut store = ChatStore::new();
        let session = session_at(100);
        let sid = session.id.clone();
        store.set_sessions(vec![session]);

        let mid = MessageId::new();
        store.append_stream_chunk(&sid, &mid, "reply", None, None);

        let prior = store
            .apply_feedback(&sid, &mid, Some(Feedback::ThumbsUp))
            .unwrap();
        assert_eq!(prior, None);

        // Rollback path: restore the prior value exactly.
        store.apply_feedback(&sid, &mid, prior);
        assert_eq!(store.messages(&sid)[0].feedback, None);
    }
}
