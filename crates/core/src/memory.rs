//! Memory domain types: long-term items, topic tags, and short-term buffers.
//!
//! A [`MemoryItem`] is a single remembered fact. Items are categorized with a
//! two-level [`TopicTag`] (e.g. `USER_IDENTITY:core`) that drives both the
//! importance model and prioritized retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Importance assigned when nothing better is known.
pub const BASE_IMPORTANCE: f32 = 0.5;

/// Clamp an importance score into `[0, 1]`. NaN maps to the base score.
pub fn clamp_importance(value: f32) -> f32 {
    if value.is_nan() {
        BASE_IMPORTANCE
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Conversation language. Selects the keyword tables used for categorization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    De,
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "de" | "german" | "deutsch" => Ok(Language::De),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Whose fact this is: the AI character or the human user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Character,
    User,
}

/// First level of a topic tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TopicGroup {
    UserIdentity,
    CharacterIdentity,
    Relationship,
    ConversationThreads,
    /// Any group emitted by the oracle that we do not model explicitly.
    Other(String),
}

impl TopicGroup {
    /// Groups guaranteed a slot during retrieval, in priority order.
    pub const PRIORITY: [TopicGroup; 4] = [
        TopicGroup::UserIdentity,
        TopicGroup::CharacterIdentity,
        TopicGroup::Relationship,
        TopicGroup::ConversationThreads,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            TopicGroup::UserIdentity => "USER_IDENTITY",
            TopicGroup::CharacterIdentity => "CHARACTER_IDENTITY",
            TopicGroup::Relationship => "RELATIONSHIP",
            TopicGroup::ConversationThreads => "CONVERSATION_THREADS",
            TopicGroup::Other(name) => name,
        }
    }

    /// Identity group for a subject.
    pub fn identity_of(subject: Subject) -> Self {
        match subject {
            Subject::Character => TopicGroup::CharacterIdentity,
            Subject::User => TopicGroup::UserIdentity,
        }
    }

    pub fn is_identity(&self) -> bool {
        match self {
            TopicGroup::UserIdentity | TopicGroup::CharacterIdentity => true,
            TopicGroup::Other(name) => name.ends_with("_IDENTITY"),
            _ => false,
        }
    }
}

impl From<String> for TopicGroup {
    fn from(value: String) -> Self {
        match value.as_str() {
            "USER_IDENTITY" => TopicGroup::UserIdentity,
            "CHARACTER_IDENTITY" => TopicGroup::CharacterIdentity,
            "RELATIONSHIP" => TopicGroup::Relationship,
            "CONVERSATION_THREADS" => TopicGroup::ConversationThreads,
            _ => TopicGroup::Other(value),
        }
    }
}

impl From<TopicGroup> for String {
    fn from(value: TopicGroup) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for TopicGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-level categorical tag, rendered as `[GROUP]` or `[GROUP:subtopic]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicTag {
    pub group: TopicGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
}

impl TopicTag {
    pub fn new(group: TopicGroup, subtopic: impl Into<String>) -> Self {
        Self {
            group,
            subtopic: Some(subtopic.into()),
        }
    }

    pub fn subtopic_is(&self, name: &str) -> bool {
        self.subtopic
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(name))
    }

    /// Parse a leading `[GROUP]` / `[GROUP:subtopic]` tag.
    ///
    /// The group must be upper-case ASCII letters, digits or underscores;
    /// anything else (e.g. `[smiles]`) is not a tag.
    pub fn parse_prefix(text: &str) -> Option<(TopicTag, &str)> {
        let rest = text.trim_start().strip_prefix('[')?;
        let end = rest.find(']')?;
        let inner = &rest[..end];
        let (group, subtopic) = match inner.split_once(':') {
            Some((g, s)) => (g, Some(s.trim())),
            None => (inner, None),
        };
        let valid_group = !group.is_empty()
            && group.starts_with(|c: char| c.is_ascii_uppercase())
            && group
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
        if !valid_group || subtopic.is_some_and(str::is_empty) {
            return None;
        }
        let tag = TopicTag {
            group: TopicGroup::from(group.to_string()),
            subtopic: subtopic.map(str::to_string),
        };
        Some((tag, rest[end + 1..].trim_start()))
    }
}

impl std::fmt::Display for TopicTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subtopic {
            Some(sub) => write!(f, "[{}:{}]", self.group, sub),
            None => write!(f, "[{}]", self.group),
        }
    }
}

/// A single long-term memory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique ID for this memory
    pub id: String,

    /// The fact, usually prefixed with its topic tag
    pub content: String,

    /// When this memory was created
    pub timestamp: DateTime<Utc>,

    /// Structured topic tag, if categorized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicTag>,

    /// Retrieval priority in `[0, 1]`
    pub importance: f32,

    /// How many times this item was surfaced into a prompt
    #[serde(default)]
    pub access_count: u32,

    /// When this item was last surfaced into a prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,

    /// Produced by compression rather than extracted from a turn
    #[serde(default)]
    pub compressed: bool,

    #[serde(default)]
    pub language: Language,
}

impl MemoryItem {
    /// Create an uncategorized item with base importance.
    pub fn new(content: impl Into<String>, language: Language) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            topic: None,
            importance: BASE_IMPORTANCE,
            access_count: 0,
            last_accessed: None,
            compressed: false,
            language,
        }
    }

    pub fn with_topic(mut self, topic: TopicTag) -> Self {
        self.topic = Some(topic);
        self
    }

    /// Set importance, clamped into `[0, 1]`.
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = clamp_importance(importance);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    /// The structured tag, or one parsed from a `[GROUP...]` content prefix.
    pub fn effective_topic(&self) -> Option<TopicTag> {
        self.topic
            .clone()
            .or_else(|| TopicTag::parse_prefix(&self.content).map(|(tag, _)| tag))
    }

    pub fn has_topic_metadata(&self) -> bool {
        self.topic.is_some() || TopicTag::parse_prefix(&self.content).is_some()
    }

    /// Record that this item was surfaced into a prompt.
    pub fn track_access(&mut self, at: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = Some(at);
    }
}

/// A short-term entry: a compact summary of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermEntry {
    pub content: String,

    /// Unredacted turn text kept in the detailed buffer, if different
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed: Option<String>,
}

impl ShortTermEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            detailed: None,
        }
    }

    pub fn with_detailed(mut self, detailed: impl Into<String>) -> Self {
        self.detailed = Some(detailed.into());
        self
    }
}

/// Bounded FIFO buffer. Oldest entries are evicted first; recency only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermBuffer {
    capacity: usize,
    entries: VecDeque<String>,
}

impl ShortTermBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Push an entry, returning the evicted ones (oldest first).
    pub fn push(&mut self, content: impl Into<String>) -> Vec<String> {
        self.entries.push_back(content.into());
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            if let Some(old) = self.entries.pop_front() {
                evicted.push(old);
            }
        }
        evicted
    }

    /// Change capacity, evicting the oldest entries if it shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_group_and_subtopic() {
        let (tag, rest) = TopicTag::parse_prefix("[USER_IDENTITY:core] name=Alex").unwrap();
        assert_eq!(tag.group, TopicGroup::UserIdentity);
        assert_eq!(tag.subtopic.as_deref(), Some("core"));
        assert_eq!(rest, "name=Alex");
    }

    #[test]
    fn parse_group_only_and_unknown_group() {
        let (tag, _) = TopicTag::parse_prefix("[WORLD_STATE] rain").unwrap();
        assert_eq!(tag.group, TopicGroup::Other("WORLD_STATE".into()));
        assert!(tag.subtopic.is_none());
        assert_eq!(tag.to_string(), "[WORLD_STATE]");
    }

    #[test]
    fn lowercase_brackets_are_not_tags() {
        assert!(TopicTag::parse_prefix("[smiles] hello").is_none());
        assert!(TopicTag::parse_prefix("no tag here").is_none());
        assert!(TopicTag::parse_prefix("[USER_IDENTITY:] empty").is_none());
    }

    #[test]
    fn topic_group_serializes_as_string() {
        let tag = TopicTag::new(TopicGroup::Relationship, "milestones");
        let json = serde_json::to_string(&tag).unwrap();
        assert!(json.contains(r#""group":"RELATIONSHIP""#));
        let back: TopicTag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }

    #[test]
    fn importance_is_clamped() {
        assert_eq!(clamp_importance(1.7), 1.0);
        assert_eq!(clamp_importance(-0.2), 0.0);
        assert_eq!(clamp_importance(f32::NAN), BASE_IMPORTANCE);
        let item = MemoryItem::new("x", Language::En).with_importance(3.0);
        assert_eq!(item.importance, 1.0);
    }

    #[test]
    fn effective_topic_falls_back_to_content_prefix() {
        let item = MemoryItem::new("[CHARACTER_IDENTITY:core] name {Mira}", Language::En);
        assert!(item.topic.is_none());
        assert!(item.has_topic_metadata());
        assert_eq!(
            item.effective_topic().unwrap().group,
            TopicGroup::CharacterIdentity
        );
    }

    #[test]
    fn buffer_keeps_most_recent_entries() {
        let mut buf = ShortTermBuffer::new(3);
        for i in 0..7 {
            buf.push(format!("turn {i}"));
            assert!(buf.len() <= 3);
        }
        let kept: Vec<&str> = buf.iter().collect();
        assert_eq!(kept, vec!["turn 4", "turn 5", "turn 6"]);
    }

    #[test]
    fn zero_capacity_buffer_stays_empty() {
        let mut buf = ShortTermBuffer::new(0);
        let evicted = buf.push("a");
        assert_eq!(evicted, vec!["a".to_string()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn language_parses_common_spellings() {
        assert_eq!("DE".parse::<Language>().unwrap(), Language::De);
        assert_eq!("english".parse::<Language>().unwrap(), Language::En);
        assert!("fr".parse::<Language>().is_err());
    }
}
