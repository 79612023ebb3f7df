use tether_api::types::SendMessageRequest;
use tether_api::Backend;
use tether_core::errors::EngineError;
use tether_core::frames::{ChatSend, ClientFrame};
use tether_core::ids::{AgentId, MessageId, SessionId};
use tether_core::message::{ChatMessage, DeliveryStatus};

use crate::engine::ChatEngine;

/// The send pipeline. Exactly one transport carries each message: the
/// realtime channel when it is connected and an agent is selected, otherwise
/// the single-shot fallback call. The two are never raced; racing would
/// produce duplicate assistant turns.
impl ChatEngine {
    /// Send into the active session, creating one first if none exists.
    pub async fn send_message(
        &self,
        content: impl Into<String>,
    ) -> Result<MessageId, EngineError> {
        let content = content.into();
        // Bind the cloned id to a local so the store guard drops before the
        // `create_session().await` below; holding it across the await would
        // deadlock the non-reentrant store lock.
        let current = self.store.lock().current_session_id().cloned();
        let session_id = match current {
            Some(id) => id,
            // Prerequisite, not a parallel branch: the session must exist
            // before the optimistic insert.
            None => self.create_session().await?,
        };
        self.send_to_session(&session_id, &content).await
    }

    /// Retry affordance for a failed message: resubmits the same content
    /// under a fresh id, into the message's own session. The failed original
    /// stays in the transcript.
    pub async fn resend_message(
        &self,
        session_id: &SessionId,
        failed_id: &MessageId,
    ) -> Result<MessageId, EngineError> {
        let content = {
            let store = self.store.lock();
            store
                .messages(session_id)
                .iter()
                .find(|m| m.id == *failed_id && m.status == DeliveryStatus::Error)
                .map(|m| m.content.clone())
        };
        let Some(content) = content else {
            return Err(EngineError::MessageSendFailed(
                "no failed message to resend".into(),
            ));
        };
        self.send_to_session(session_id, &content).await
    }

    async fn send_to_session(
        &self,
        session_id: &SessionId,
        content: &str,
    ) -> Result<MessageId, EngineError> {
        let message_id = MessageId::new();
        let (realtime_eligible, agent_id) = {
            let mut store = self.store.lock();
            store.add_optimistic_user_message(ChatMessage::user(
                session_id.clone(),
                message_id.clone(),
                content,
            ));
            let agent = store.selected_agent().cloned();
            let eligible = store.connection_status().is_connected() && agent.is_some();
            (eligible, agent)
        };

        if realtime_eligible {
            self.send_realtime(session_id, &message_id, content, agent_id)?;
        } else {
            self.send_fallback(session_id, &message_id, content, agent_id)
                .await?;
        }
        Ok(message_id)
    }

    fn send_realtime(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        content: &str,
        agent_id: Option<AgentId>,
    ) -> Result<(), EngineError> {
        let agent_name = {
            let agents = self.agents.lock();
            agent_id
                .as_ref()
                .and_then(|id| agents.iter().find(|a| &a.id == id))
                .map(|a| a.name.clone())
        };
        let frame = ClientFrame::Chat {
            data: ChatSend {
                agent_id,
                message: content.to_string(),
                message_id: message_id.clone(),
                session_id: session_id.clone(),
                metadata: serde_json::Map::new(),
            },
        };
        {
            let mut store = self.store.lock();
            store.set_active_stream(Some(session_id.clone()));
            store.set_typing(agent_name);
        }

        match self.channel.send_frame(&frame) {
            Ok(()) => {
                // `sent`, not `delivered`: delivery is only confirmed by a
                // later completion frame.
                self.store.lock().mark_message_status(
                    session_id,
                    message_id,
                    DeliveryStatus::Sent,
                    None,
                );
                self.metrics.record_realtime_send();
                Ok(())
            }
            Err(e) => {
                let err = EngineError::MessageSendFailed(e.to_string());
                let mut store = self.store.lock();
                store.mark_message_status(
                    session_id,
                    message_id,
                    DeliveryStatus::Error,
                    Some(e.to_string()),
                );
                store.clear_typing();
                store.set_active_stream(None);
                store.report_error(&err);
                self.metrics.record_failed_send();
                Err(err)
            }
        }
    }

    /// Single attempt, no internal retry: a silent retry risks a duplicate
    /// assistant turn, so retries stay explicit caller actions.
    async fn send_fallback(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        content: &str,
        agent_id: Option<AgentId>,
    ) -> Result<(), EngineError> {
        self.store.lock().set_typing(None);
        let request = SendMessageRequest {
            id: message_id.clone(),
            content: content.to_string(),
            agent_id,
            metadata: serde_json::Map::new(),
        };

        match self.backend.send_message(session_id, request).await {
            Ok(response) => {
                let mut store = self.store.lock();
                // Reconcile into the session the send targeted, even if the
                // caller switched sessions while the request was in flight.
                store.upsert_session(response.session);
                store.upsert_message(response.user_message);
                store.upsert_message(response.assistant_message);
                store.clear_typing();
                self.metrics.record_fallback_send();
                Ok(())
            }
            Err(e) => {
                let err = EngineError::MessageSendFailed(e.to_string());
                let mut store = self.store.lock();
                store.mark_message_status(
                    session_id,
                    message_id,
                    DeliveryStatus::Error,
                    Some(e.to_string()),
                );
                store.clear_typing();
                store.report_error(&err);
                self.metrics.record_failed_send();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use crate::ChatEngine;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tether_api::types::AgentProfile;
    use tether_api::MockBackend;
    use tether_core::message::Sender;
    use tether_core::session::Session;

    async fn bootstrapped_engine(backend: Arc<MockBackend>) -> ChatEngine {
        let (connector, _remotes) = MockConnector::new();
        let engine = ChatEngine::new(backend, connector, "mock://realtime");
        engine.bootstrap().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn fallback_send_reconciles_both_messages() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new();
        let sid = session.id.clone();
        backend.add_session(session);
        let engine = bootstrapped_engine(Arc::clone(&backend)).await;

        let id = engine.send_message("hello").await.unwrap();

        assert_eq!(backend.send_calls.load(Ordering::Relaxed), 1);
        let store = engine.store();
        let store = store.lock();
        let messages = store.messages(&sid);
        // Optimistic user entry merged with the echo, plus the assistant
        // reply: exactly two entries.
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].status, DeliveryStatus::Delivered);
        assert_eq!(messages[1].sender, Sender::Agent);
        assert_eq!(messages[1].content, "echo: hello");
        assert!(!store.typing().is_typing);

        let session = store.session(&sid).unwrap();
        assert_eq!(session.message_count, 2);
        assert_eq!(session.last_message.as_deref(), Some("echo: hello"));
    }

    #[tokio::test]
    async fn send_creates_session_when_none_exists() {
        let backend = Arc::new(MockBackend::new());
        let (connector, _remotes) = MockConnector::new();
        let engine = ChatEngine::new(Arc::clone(&backend) as Arc<dyn tether_api::Backend>, connector, "mock://realtime");

        engine.send_message("first words").await.unwrap();

        assert!(backend.create_session_calls.load(Ordering::Relaxed) >= 1);
        let store = engine.store();
        let store = store.lock();
        let sid = store.current_session_id().cloned().unwrap();
        assert_eq!(store.messages(&sid).len(), 2);
    }

    #[tokio::test]
    async fn fallback_failure_marks_error_and_surfaces_nonrecoverable() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new();
        let sid = session.id.clone();
        backend.add_session(session);
        backend.fail_send(true);
        let engine = bootstrapped_engine(Arc::clone(&backend)).await;

        let result = engine.send_message("doomed").await;
        assert!(matches!(result, Err(EngineError::MessageSendFailed(_))));

        let store = engine.store();
        let store = store.lock();
        let messages = store.messages(&sid);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, DeliveryStatus::Error);
        assert!(messages[0].error.is_some());
        assert!(!store.typing().is_typing);

        let notice = store.last_error().unwrap();
        assert_eq!(notice.code, "message_send_failed");
        assert!(!notice.recoverable);
    }

    #[tokio::test]
    async fn realtime_path_used_when_connected_with_agent() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new();
        let sid = session.id.clone();
        backend.add_session(session);

        let (connector, mut remotes) = MockConnector::new();
        let engine = ChatEngine::new(
            Arc::clone(&backend) as Arc<dyn tether_api::Backend>,
            connector,
            "mock://realtime",
        );
        engine.bootstrap().await.unwrap();

        let agent = AgentId::new();
        *engine.agents.lock() = vec![AgentProfile {
            id: agent.clone(),
            name: "Atlas".into(),
            description: None,
        }];
        engine.select_agent(Some(agent.clone()));
        engine.connect().await;
        let mut remote = remotes.recv().await.unwrap();

        let id = engine.send_message("over the socket").await.unwrap();

        // The frame went out over the channel, not the fallback.
        assert_eq!(backend.send_calls.load(Ordering::Relaxed), 0);
        let outbound = remote.from_client.recv().await.unwrap();
        assert!(outbound.contains(r#""type":"chat""#));
        assert!(outbound.contains(id.as_str()));
        assert!(outbound.contains(sid.as_str()));
        assert!(outbound.contains(agent.as_str()));

        let store = engine.store();
        let store = store.lock();
        // `sent` until a completion frame confirms delivery.
        assert_eq!(store.messages(&sid)[0].status, DeliveryStatus::Sent);
        assert_eq!(store.active_stream(), Some(&sid));
        assert!(store.typing().is_typing);
        assert_eq!(store.typing().agent_name.as_deref(), Some("Atlas"));
    }

    #[tokio::test]
    async fn connected_without_agent_falls_back() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new();
        backend.add_session(session);

        let (connector, mut remotes) = MockConnector::new();
        let engine = ChatEngine::new(
            Arc::clone(&backend) as Arc<dyn tether_api::Backend>,
            connector,
            "mock://realtime",
        );
        engine.bootstrap().await.unwrap();
        engine.connect().await;
        let _remote = remotes.recv().await.unwrap();

        engine.send_message("no agent selected").await.unwrap();
        assert_eq!(backend.send_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn fallback_reconciles_into_original_session_after_switch() {
        let backend = Arc::new(MockBackend::new());
        let original = Session::new();
        let other = Session::new();
        let (original_id, other_id) = (original.id.clone(), other.id.clone());
        backend.add_session(original);
        backend.add_session(other);
        let engine = bootstrapped_engine(Arc::clone(&backend)).await;

        // A failed send leaves its message in the original session...
        backend.fail_send(true);
        engine.switch_session(original_id.clone()).await.unwrap();
        let failed = engine.send_message("try one").await.unwrap_err();
        assert!(matches!(failed, EngineError::MessageSendFailed(_)));
        let failed_id = engine.store().lock().messages(&original_id)[0].id.clone();

        // ...the user navigates away, then retries the failed message.
        backend.fail_send(false);
        engine.switch_session(other_id.clone()).await.unwrap();
        let new_id = engine
            .resend_message(&original_id, &failed_id)
            .await
            .unwrap();

        let store = engine.store();
        let store = store.lock();
        let original_messages = store.messages(&original_id);
        // Failed original + resent copy + assistant reply, all in the
        // original session; nothing leaked into the active one.
        assert_eq!(original_messages.len(), 3);
        assert!(original_messages.iter().any(|m| m.id == failed_id
            && m.status == DeliveryStatus::Error));
        assert!(original_messages
            .iter()
            .any(|m| m.id == new_id && m.status == DeliveryStatus::Delivered));
        assert!(store.messages(&other_id).is_empty());
        assert_ne!(failed_id, new_id);
    }

    #[tokio::test]
    async fn resend_requires_a_failed_message() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new();
        let sid = session.id.clone();
        backend.add_session(session);
        let engine = bootstrapped_engine(Arc::clone(&backend)).await;

        let delivered = engine.send_message("fine").await.unwrap();
        let result = engine.resend_message(&sid, &delivered).await;
        assert!(matches!(result, Err(EngineError::MessageSendFailed(_))));
    }

    #[tokio::test]
    async fn send_metrics_track_paths() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new();
        backend.add_session(session);
        let engine = bootstrapped_engine(Arc::clone(&backend)).await;

        engine.send_message("one").await.unwrap();
        backend.fail_send(true);
        let _ = engine.send_message("two").await;

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.fallback_sends, 1);
        assert_eq!(snapshot.sends_failed, 1);
        assert_eq!(snapshot.realtime_sends, 0);
    }
}
