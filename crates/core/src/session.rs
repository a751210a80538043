//! Session: everything remembered about one ongoing roleplay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::Language;
use crate::store::{MemoryStore, StoreLimits};

/// A relationship milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub change: String,
    pub timestamp: DateTime<Utc>,
}

/// Current outfit of both participants, as last reported by the sidecar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clothing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub language: Language,
    pub memory: MemoryStore,
    #[serde(default)]
    pub character_profile: String,
    #[serde(default)]
    pub user_profile: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub clothing: Clothing,
}

impl Session {
    pub fn new(id: impl Into<String>, limits: StoreLimits) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            language: Language::default(),
            memory: MemoryStore::new(limits),
            character_profile: String::new(),
            user_profile: String::new(),
            history: Vec::new(),
            location: None,
            date: None,
            clothing: Clothing::default(),
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_profiles(
        mut self,
        character_profile: impl Into<String>,
        user_profile: impl Into<String>,
    ) -> Self {
        self.character_profile = character_profile.into();
        self.user_profile = user_profile.into();
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record a relationship milestone unless a similar one exists.
    ///
    /// Similarity is case-insensitive substring containment in either
    /// direction. This suppresses "first kiss" after "their first kiss in
    /// the rain" but also any longer milestone that merely contains an
    /// earlier short one. Returns whether the entry was inserted.
    pub fn record_history(&mut self, change: &str, at: DateTime<Utc>) -> bool {
        let change = change.trim();
        if change.is_empty() {
            return false;
        }
        let needle = change.to_lowercase();
        let duplicate = self.history.iter().any(|entry| {
            let existing = entry.change.to_lowercase();
            existing.contains(&needle) || needle.contains(&existing)
        });
        if duplicate {
            return false;
        }
        self.history.push(HistoryEntry {
            change: change.to_string(),
            timestamp: at,
        });
        true
    }
}

/// Listing entry returned by session stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}
