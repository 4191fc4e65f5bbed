use std::collections::HashMap;
use std::sync::Arc;

use slab::Slab;
use tokio::sync::RwLock;

use crate::session::{ActiveSession, Session};

/// Sessions currently live, keyed by the ingest server's session id.
///
/// Records are inserted fully built and removed whole, so readers never see a
/// partial session.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    sessions: Slab<Session>,
    index: HashMap<String, usize>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands the session back if its id is already live.
    pub async fn insert(&self, session: Session) -> Result<(), Session> {
        let mut inner = self.inner.write().await;
        if inner.index.contains_key(session.id()) {
            return Err(session);
        }
        let id = session.id().to_string();
        let key = inner.sessions.insert(session);
        inner.index.insert(id, key);
        Ok(())
    }

    pub async fn remove(&self, session_id: &str) -> Option<Session> {
        let mut inner = self.inner.write().await;
        let key = inner.index.remove(session_id)?;
        Some(inner.sessions.remove(key))
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.read().await.index.contains_key(session_id)
    }

    pub async fn snapshot(&self) -> Vec<ActiveSession> {
        let inner = self.inner.read().await;
        inner
            .sessions
            .iter()
            .map(|(_, session)| session.summary())
            .collect()
    }

    /// Removes every session.
    pub async fn drain(&self) -> Vec<Session> {
        let mut inner = self.inner.write().await;
        inner.index.clear();
        inner.sessions.drain().collect()
    }
}
