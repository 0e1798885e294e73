use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::application::ports::SessionStorePort;
use crate::domain::{
    errors::{DomainError, DomainResult},
    session::{SessionId, SessionState},
};

struct Entry {
    state: SessionState,
    last_seen: Instant,
}

/// Process-local sessions; everything is lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> DomainError {
    DomainError::OperationFailed("session store lock poisoned".into())
}

fn missing(id: SessionId) -> DomainError {
    DomainError::NotFound(format!("session {id}"))
}

impl SessionStorePort for InMemorySessionStore {
    fn create(&self, confidence: f32) -> DomainResult<SessionState> {
        let session = SessionState::new(Uuid::new_v4(), confidence);
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        map.insert(session.id, Entry { state: session.clone(), last_seen: Instant::now() });
        Ok(session)
    }

    /// Reading a session counts as activity.
    fn get(&self, id: SessionId) -> DomainResult<SessionState> {
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        let entry = map.get_mut(&id).ok_or_else(|| missing(id))?;
        entry.last_seen = Instant::now();
        Ok(entry.state.clone())
    }

    /// Applies `f` to a scratch copy and commits it only if `f` succeeds.
    fn update(
        &self,
        id: SessionId,
        f: &mut dyn FnMut(&mut SessionState) -> DomainResult<()>,
    ) -> DomainResult<SessionState> {
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        let entry = map.get_mut(&id).ok_or_else(|| missing(id))?;
        entry.last_seen = Instant::now();
        let mut next = entry.state.clone();
        f(&mut next)?;
        entry.state = next.clone();
        Ok(next)
    }

    fn remove(&self, id: SessionId) -> DomainResult<SessionState> {
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        map.remove(&id).map(|e| e.state).ok_or_else(|| missing(id))
    }

    fn idle_sessions(&self, ttl: Duration) -> DomainResult<Vec<SessionId>> {
        let map = self.sessions.read().map_err(|_| poisoned())?;
        Ok(map
            .iter()
            .filter(|(_, e)| e.last_seen.elapsed() >= ttl)
            .map(|(id, _)| *id)
            .collect())
    }
}
