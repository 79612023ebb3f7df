use tether_core::ids::{AgentId, SessionId};
use tether_core::session::Session;

/// The set of known sessions and which one is active. All operations are
/// synchronous and infallible; callers report network failures elsewhere.
///
/// Display order is descending by `Session::sort_key()`. The sort is stable,
/// so sessions with equal keys keep their insertion order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    current: Option<SessionId>,
    selected_agent: Option<AgentId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the known set. Keeps the current selection when it is still
    /// valid; otherwise selects the newest session (or none).
    pub fn set_sessions(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions;
        self.resort();

        let current_valid = self
            .current
            .as_ref()
            .is_some_and(|id| self.sessions.iter().any(|s| &s.id == id));
        if !current_valid {
            self.current = self.sessions.first().map(|s| s.id.clone());
            self.sync_selected_agent();
        }
    }

    /// Insert or replace by id, then re-sort.
    pub fn upsert(&mut self, session: Session) {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session,
            None => self.sessions.push(session),
        }
        self.resort();
    }

    /// Delete a session. If it was active, the next-newest remaining session
    /// becomes active and the agent selection is re-derived from it.
    pub fn remove(&mut self, id: &SessionId) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| &s.id != id);
        let removed = self.sessions.len() < before;

        if removed && self.current.as_ref() == Some(id) {
            self.current = self.sessions.first().map(|s| s.id.clone());
            self.sync_selected_agent();
        }
        removed
    }

    /// Explicit switch from session-select UI.
    pub fn set_current(&mut self, id: SessionId) {
        self.current = Some(id);
        self.sync_selected_agent();
    }

    /// Record the caller's agent choice, mirrored onto the current session so
    /// re-selecting the session later restores it.
    pub fn set_selected_agent(&mut self, agent: Option<AgentId>) {
        self.selected_agent = agent.clone();
        if let Some(current) = self.current_mut() {
            current.selected_agent_id = agent;
        }
    }

    pub fn resort(&mut self) {
        self.sessions.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn current_id(&self) -> Option<&SessionId> {
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&Session> {
        let id = self.current.as_ref()?;
        self.sessions.iter().find(|s| &s.id == id)
    }

    pub fn current_mut(&mut self) -> Option<&mut Session> {
        let id = self.current.clone()?;
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| &s.id == id)
    }

    pub fn selected_agent(&self) -> Option<&AgentId> {
        self.selected_agent.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn sync_selected_agent(&mut self) {
        self.selected_agent = self.current().and_then(|s| s.selected_agent_id.clone());
    }
}
