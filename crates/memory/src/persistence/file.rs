//! File-based session store: one pretty-printed JSON file per session.
//!
//! Layout: `<dir>/<session_id>.json`. Writes go to a `.tmp` sibling first and
//! are renamed into place, so a crash mid-write leaves the previous snapshot
//! intact. Files are human-inspectable and can be edited by hand.

use async_trait::async_trait;
use mnemos_core::error::PersistenceError;
use mnemos_core::persistence::{SessionStore, validate_session_id};
use mnemos_core::session::{Session, SessionSummary};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const EXTENSION: &str = "json";

pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.{EXTENSION}"))
    }
}

fn storage(context: &str, e: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::Storage(format!("{context}: {e}"))
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        validate_session_id(&session.id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage("Failed to create session directory", e))?;

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| storage("Failed to serialize session", e))?;

        let path = self.path_for(&session.id);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage("Failed to write session file", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage("Failed to move session file into place", e))?;

        debug!(session_id = %session.id, path = %path.display(), "Session saved");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>, PersistenceError> {
        validate_session_id(session_id)?;
        let content = match tokio::fs::read_to_string(self.path_for(session_id)).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage("Failed to read session file", e)),
        };
        let session = serde_json::from_str::<Session>(&content).map_err(|e| {
            PersistenceError::Corrupted {
                session_id: session_id.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some(session))
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, PersistenceError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage("Failed to read session directory", e)),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| storage("Failed to read session directory", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<Session>(&content) {
                Ok(session) => summaries.push(SessionSummary {
                    session_id: session.id,
                    timestamp: session.updated_at,
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping corrupted session file");
                }
            }
        }

        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> Result<bool, PersistenceError> {
        validate_session_id(session_id)?;
        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage("Failed to delete session file", e)),
        }
    }
}
