//! Session persistence trait.
//!
//! Stores are treated as at-least-once durable storage with no transactional
//! guarantees. A live process keeps its own cache as the source of truth.
//!
//! Implementations: JSON files, in-memory (for testing), LRU-cached wrapper.

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::session::{Session, SessionSummary};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "file", "memory").
    fn name(&self) -> &str;

    /// Persist a full session snapshot.
    async fn save(&self, session: &Session) -> Result<(), PersistenceError>;

    /// Load a session snapshot, `None` if it was never saved.
    async fn load(&self, session_id: &str) -> Result<Option<Session>, PersistenceError>;

    /// List stored sessions, most recently updated first.
    async fn list(&self) -> Result<Vec<SessionSummary>, PersistenceError>;

    /// Delete a session. Returns whether anything was removed.
    async fn delete(&self, session_id: &str) -> Result<bool, PersistenceError>;
}

/// Reject ids that cannot safely be used as a storage key or file name.
pub fn validate_session_id(session_id: &str) -> Result<(), PersistenceError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !session_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidSessionId(session_id.to_string()))
    }
}
