//! In-memory session store: useful for testing and ephemeral chats.

use async_trait::async_trait;
use mnemos_core::error::PersistenceError;
use mnemos_core::persistence::{SessionStore, validate_session_id};
use mnemos_core::session::{Session, SessionSummary};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        validate_session_id(&session.id)?;
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>, PersistenceError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, PersistenceError> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| SessionSummary {
                session_id: s.id.clone(),
                timestamp: s.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> Result<bool, PersistenceError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }
}
