use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tether_api::types::AgentProfile;
use tether_api::Backend;
use tether_core::errors::EngineError;
use tether_core::ids::{AgentId, SessionId};
use tether_store::ChatStore;
use tether_telemetry::EngineMetrics;

use crate::channel::ChannelManager;
use crate::transport::TransportConnector;
use crate::SharedStore;

/// The top-level engine context: shared store, fallback backend, realtime
/// channel and metrics, wired together and injected everywhere. Owned by the
/// application; nothing here is a global.
pub struct ChatEngine {
    pub(crate) store: SharedStore,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) channel: Arc<ChannelManager>,
    pub(crate) metrics: Arc<EngineMetrics>,
    pub(crate) agents: Mutex<Vec<AgentProfile>>,
    refresh_task: JoinHandle<()>,
}

impl ChatEngine {
    pub fn new(
        backend: Arc<dyn Backend>,
        connector: Arc<dyn TransportConnector>,
        realtime_url: impl Into<String>,
    ) -> Self {
        let store: SharedStore = Arc::new(Mutex::new(ChatStore::new()));
        let metrics = Arc::new(EngineMetrics::new());
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let channel = ChannelManager::new(
            realtime_url.into(),
            connector,
            Arc::clone(&store),
            Arc::clone(&metrics),
            refresh_tx,
        );
        let refresh_task =
            spawn_session_refresher(refresh_rx, Arc::clone(&backend), Arc::clone(&store));

        Self {
            store,
            backend,
            channel,
            metrics,
            agents: Mutex::new(Vec::new()),
            refresh_task,
        }
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn agents(&self) -> Vec<AgentProfile> {
        self.agents.lock().clone()
    }

    pub fn select_agent(&self, agent: Option<AgentId>) {
        self.store.lock().set_selected_agent(agent);
    }

    pub async fn connect(&self) {
        self.channel.connect().await;
    }

    /// The "reconnect" banner action: reset backoff and dial immediately.
    pub async fn reconnect_now(&self) {
        self.channel.reconnect_now().await;
    }

    pub fn shutdown(&self) {
        self.channel.shutdown();
        self.refresh_task.abort();
    }

    /// Initial load: agent roster, session list (creating a first session
    /// when none exist) and the current session's transcript. Roster failure
    /// degrades agent selection but does not abort the bootstrap.
    pub async fn bootstrap(&self) -> Result<(), EngineError> {
        self.store.lock().set_bootstrapping(true);
        let result = self.bootstrap_inner().await;
        {
            let mut store = self.store.lock();
            store.set_bootstrapping(false);
            if let Err(e) = &result {
                store.report_error(e);
            }
        }
        result
    }

    async fn bootstrap_inner(&self) -> Result<(), EngineError> {
        match self.backend.list_agents().await {
            Ok(roster) => *self.agents.lock() = roster,
            Err(e) => {
                let err = EngineError::AgentsLoadFailed(e.to_string());
                self.store.lock().report_error(&err);
            }
        }

        let sessions = self
            .backend
            .list_sessions()
            .await
            .map_err(|e| EngineError::BootstrapFailed(e.to_string()))?;
        let need_initial = sessions.is_empty();
        self.store.lock().set_sessions(sessions);

        if need_initial {
            let agent = self.store.lock().selected_agent().cloned();
            let session = self
                .backend
                .create_session(agent.as_ref())
                .await
                .map_err(|e| EngineError::SessionCreateFailed(e.to_string()))?;
            let id = session.id.clone();
            let mut store = self.store.lock();
            store.upsert_session(session);
            store.set_current_session(id);
        }

        let current = self.store.lock().current_session_id().cloned();
        if let Some(id) = current {
            self.load_messages(&id).await?;
        }
        Ok(())
    }

    /// Explicit "new chat" action.
    pub async fn create_session(&self) -> Result<SessionId, EngineError> {
        let agent = self.store.lock().selected_agent().cloned();
        match self.backend.create_session(agent.as_ref()).await {
            Ok(session) => {
                let id = session.id.clone();
                let mut store = self.store.lock();
                store.upsert_session(session);
                store.set_current_session(id.clone());
                store.replace_messages(&id, Vec::new());
                Ok(id)
            }
            Err(e) => {
                let err = EngineError::SessionCreateFailed(e.to_string());
                self.store.lock().report_error(&err);
                Err(err)
            }
        }
    }

    /// Switch sessions, loading the transcript on first visit.
    pub async fn switch_session(&self, id: SessionId) -> Result<(), EngineError> {
        let loaded = {
            let mut store = self.store.lock();
            store.set_current_session(id.clone());
            store.has_messages_loaded(&id)
        };
        if loaded {
            return Ok(());
        }
        match self.load_messages(&id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.store.lock().report_error(&e);
                Err(e)
            }
        }
    }

    pub async fn delete_session(&self, id: &SessionId) -> Result<(), EngineError> {
        if let Err(e) = self.backend.delete_session(id).await {
            let err = EngineError::SessionDeleteFailed(e.to_string());
            self.store.lock().report_error(&err);
            return Err(err);
        }

        let promoted = {
            let mut store = self.store.lock();
            store.remove_session(id);
            store.current_session_id().cloned()
        };
        if let Some(next) = promoted {
            if !self.store.lock().has_messages_loaded(&next) {
                if let Err(e) = self.load_messages(&next).await {
                    self.store.lock().report_error(&e);
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn load_messages(&self, id: &SessionId) -> Result<(), EngineError> {
        self.store.lock().set_session_loading(true);
        let result = self.backend.list_messages(id).await;
        let mut store = self.store.lock();
        store.set_session_loading(false);
        match result {
            Ok(messages) => {
                store.replace_messages(id, messages);
                Ok(())
            }
            Err(e) => Err(EngineError::SessionLoadFailed(e.to_string())),
        }
    }
}

/// Out-of-band session-summary refresh requested by completion frames.
fn spawn_session_refresher(
    mut rx: mpsc::UnboundedReceiver<SessionId>,
    backend: Arc<dyn Backend>,
    store: SharedStore,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(session_id) = rx.recv().await {
            match backend.get_session(&session_id).await {
                Ok(session) => store.lock().upsert_session(session),
                Err(e) => {
                    tracing::warn!(session_id = %session_id, "session refresh failed: {e}")
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use std::sync::atomic::Ordering;
    use tether_api::MockBackend;
    use tether_core::message::ChatMessage;
    use tether_core::session::Session;

    fn engine_with(backend: Arc<MockBackend>) -> ChatEngine {
        let (connector, _remotes) = MockConnector::new();
        ChatEngine::new(backend, connector, "mock://realtime")
    }

    #[tokio::test]
    async fn bootstrap_with_existing_sessions_loads_newest() {
        let backend = Arc::new(MockBackend::new());
        let older = Session::new();
        let mut newer = Session::new();
        newer.created_at = chrono::Utc::now() + chrono::Duration::seconds(60);
        let newest_id = newer.id.clone();
        backend.add_session(older);
        backend.add_session(newer);
        backend.set_messages(
            newest_id.clone(),
            vec![ChatMessage::user(
                newest_id.clone(),
                tether_core::ids::MessageId::new(),
                "earlier",
            )],
        );

        let engine = engine_with(Arc::clone(&backend));
        engine.bootstrap().await.unwrap();

        let store = engine.store();
        let store = store.lock();
        assert_eq!(store.current_session_id(), Some(&newest_id));
        assert_eq!(store.messages(&newest_id).len(), 1);
        assert!(!store.is_bootstrapping());
        assert_eq!(backend.create_session_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn bootstrap_creates_initial_session_when_none_exist() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(Arc::clone(&backend));

        engine.bootstrap().await.unwrap();

        assert_eq!(backend.create_session_calls.load(Ordering::Relaxed), 1);
        let store = engine.store();
        let store = store.lock();
        assert_eq!(store.sessions().len(), 1);
        assert!(store.current_session_id().is_some());
    }

    #[tokio::test]
    async fn bootstrap_failure_reports_and_clears_flag() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_list_sessions(true);
        let engine = engine_with(Arc::clone(&backend));

        let result = engine.bootstrap().await;
        assert!(matches!(result, Err(EngineError::BootstrapFailed(_))));

        let store = engine.store();
        let store = store.lock();
        assert!(!store.is_bootstrapping());
        assert_eq!(store.last_error().unwrap().code, "bootstrap_failed");
        assert!(store.last_error().unwrap().recoverable);
    }

    #[tokio::test]
    async fn roster_failure_is_nonfatal() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_list_agents(true);
        let engine = engine_with(Arc::clone(&backend));

        engine.bootstrap().await.unwrap();

        assert!(engine.agents().is_empty());
        let store = engine.store();
        let store = store.lock();
        assert_eq!(store.last_error().unwrap().code, "agents_load_failed");
        assert!(store.last_error().unwrap().recoverable);
        // The transcript still bootstrapped.
        assert!(store.current_session_id().is_some());
    }

    #[tokio::test]
    async fn switch_session_loads_transcript_once() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new();
        let sid = session.id.clone();
        backend.add_session(session.clone());
        backend.set_messages(
            sid.clone(),
            vec![ChatMessage::user(
                sid.clone(),
                tether_core::ids::MessageId::new(),
                "history",
            )],
        );
        let other = Session::new();
        backend.add_session(other.clone());

        let engine = engine_with(Arc::clone(&backend));
        engine.bootstrap().await.unwrap();

        engine.switch_session(sid.clone()).await.unwrap();
        assert_eq!(engine.store().lock().messages(&sid).len(), 1);

        // Second switch does not re-fetch; ledger stays as-is.
        engine.switch_session(sid.clone()).await.unwrap();
        assert_eq!(engine.store().lock().messages(&sid).len(), 1);
    }

    #[tokio::test]
    async fn switch_session_failure_reports_session_load_failed() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new();
        backend.add_session(session);
        let engine = engine_with(Arc::clone(&backend));
        engine.bootstrap().await.unwrap();

        backend.fail_list_messages(true);
        let fresh = SessionId::new();
        let result = engine.switch_session(fresh).await;
        assert!(matches!(result, Err(EngineError::SessionLoadFailed(_))));
        assert_eq!(
            engine.store().lock().last_error().unwrap().code,
            "session_load_failed"
        );
    }

    #[tokio::test]
    async fn create_session_makes_it_current() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(Arc::clone(&backend));

        let id = engine.create_session().await.unwrap();
        let store = engine.store();
        let store = store.lock();
        assert_eq!(store.current_session_id(), Some(&id));
        assert!(store.has_messages_loaded(&id));
        assert!(store.messages(&id).is_empty());
    }

    #[tokio::test]
    async fn delete_active_session_promotes_next() {
        let backend = Arc::new(MockBackend::new());
        let b = Session::new();
        let mut a = Session::new();
        a.created_at = chrono::Utc::now() + chrono::Duration::seconds(60);
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        backend.add_session(b);
        backend.add_session(a);

        let engine = engine_with(Arc::clone(&backend));
        engine.bootstrap().await.unwrap();
        assert_eq!(engine.store().lock().current_session_id(), Some(&a_id));

        engine.delete_session(&a_id).await.unwrap();

        let store = engine.store();
        let store = store.lock();
        assert_eq!(store.current_session_id(), Some(&b_id));
        assert!(store.messages(&a_id).is_empty());
    }

    #[tokio::test]
    async fn delete_failure_keeps_session_and_reports() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new();
        let sid = session.id.clone();
        backend.add_session(session);
        let engine = engine_with(Arc::clone(&backend));
        engine.bootstrap().await.unwrap();

        // Deleting a session the backend no longer knows about fails.
        let ghost = SessionId::new();
        let result = engine.delete_session(&ghost).await;
        assert!(matches!(result, Err(EngineError::SessionDeleteFailed(_))));
        assert_eq!(
            engine.store().lock().last_error().unwrap().code,
            "session_delete_failed"
        );
        assert!(engine.store().lock().session(&sid).is_some());
    }

    #[tokio::test]
    async fn select_agent_reaches_registry() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(Arc::clone(&backend));
        engine.bootstrap().await.unwrap();

        let agent = AgentId::new();
        engine.select_agent(Some(agent.clone()));
        assert_eq!(engine.store().lock().selected_agent(), Some(&agent));
    }
}
