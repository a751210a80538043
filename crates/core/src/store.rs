//! The per-session memory store.
//!
//! Holds the three memory tiers and the compression bookkeeping:
//!
//! | Tier | Growth | Reduced by |
//! |------|--------|------------|
//! | Short-term (+ detailed) | FIFO, fixed capacity | eviction of the oldest entry |
//! | Long-term | append-only | compression (full replace) or manual clear |
//! | Deep memory | replace-only | never |
//!
//! The store never calls out to an oracle. Retrieval and compression read an
//! immutable snapshot and hand their results back through
//! [`MemoryStore::track_access`] and [`MemoryStore::apply_compression`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MemoryError;
use crate::memory::{MemoryItem, ShortTermBuffer, ShortTermEntry};

pub const DEFAULT_SHORT_TERM_CAPACITY: usize = 10;
pub const DEFAULT_DETAILED_CAPACITY: usize = 2;

/// Compression bookkeeping for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionMetadata {
    /// Calls counted since the last successful compression
    pub total_api_calls: u32,
    pub compression_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_compression_time: Option<DateTime<Utc>>,
    pub memories_before_last_compression: usize,
    pub memories_after_last_compression: usize,
}

/// Sizing and switches for a [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLimits {
    pub short_term_capacity: usize,
    pub detailed_capacity: usize,
    pub compression_enabled: bool,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            short_term_capacity: DEFAULT_SHORT_TERM_CAPACITY,
            detailed_capacity: DEFAULT_DETAILED_CAPACITY,
            compression_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    short_term: ShortTermBuffer,
    detailed: ShortTermBuffer,
    long_term: Vec<MemoryItem>,
    #[serde(default)]
    deep_memory: String,
    #[serde(default)]
    metadata: CompressionMetadata,
    compression_enabled: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreLimits::default())
    }
}

impl MemoryStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            short_term: ShortTermBuffer::new(limits.short_term_capacity),
            detailed: ShortTermBuffer::new(limits.detailed_capacity),
            long_term: Vec::new(),
            deep_memory: String::new(),
            metadata: CompressionMetadata::default(),
            compression_enabled: limits.compression_enabled,
        }
    }

    /// Re-apply configured limits to a store loaded from disk.
    pub fn apply_limits(&mut self, limits: StoreLimits) {
        self.short_term.set_capacity(limits.short_term_capacity);
        self.detailed.set_capacity(limits.detailed_capacity);
        self.compression_enabled = limits.compression_enabled;
    }

    // ── Short-term ──

    /// Push to both short-term buffers. Each evicts its own oldest entries.
    pub fn append_short_term(&mut self, entry: ShortTermEntry) {
        let detailed = entry.detailed.unwrap_or_else(|| entry.content.clone());
        let evicted = self.short_term.push(entry.content);
        self.detailed.push(detailed);
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "Short-term buffer evicted oldest entries");
        }
    }

    /// Empty both short-term buffers. Long-term and deep memory are untouched.
    pub fn clear_short_term(&mut self) {
        self.short_term.clear();
        self.detailed.clear();
    }

    pub fn short_term(&self) -> &ShortTermBuffer {
        &self.short_term
    }

    pub fn detailed(&self) -> &ShortTermBuffer {
        &self.detailed
    }

    // ── Long-term ──

    /// Append an item. Counts towards the compression trigger when enabled.
    pub fn append_long_term(&mut self, item: MemoryItem) {
        self.long_term.push(item);
        if self.compression_enabled {
            self.metadata.total_api_calls += 1;
        }
    }

    pub fn long_term(&self) -> &[MemoryItem] {
        &self.long_term
    }

    /// An owned copy for retrieval or compression to work on.
    pub fn long_term_snapshot(&self) -> Vec<MemoryItem> {
        self.long_term.clone()
    }

    pub fn long_term_len(&self) -> usize {
        self.long_term.len()
    }

    /// Manual clear. Returns how many items were dropped.
    pub fn clear_long_term(&mut self) -> usize {
        let dropped = self.long_term.len();
        self.long_term.clear();
        dropped
    }

    /// Mark an item as surfaced into a prompt.
    pub fn track_access(&mut self, id: &str, at: DateTime<Utc>) -> Result<(), MemoryError> {
        let item = self
            .long_term
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| MemoryError::UnknownItem(id.to_string()))?;
        item.track_access(at);
        Ok(())
    }

    /// Swap the long-term list for a compressed one and update bookkeeping.
    ///
    /// `before` is the size of the snapshot the compression started from.
    pub fn apply_compression(&mut self, items: Vec<MemoryItem>, before: usize, at: DateTime<Utc>) {
        self.metadata.memories_before_last_compression = before;
        self.metadata.memories_after_last_compression = items.len();
        self.metadata.total_api_calls = 0;
        self.metadata.compression_count += 1;
        self.metadata.last_compression_time = Some(at);
        self.long_term = items;
    }

    // ── Deep memory ──

    pub fn set_deep_memory(&mut self, text: impl Into<String>) {
        self.deep_memory = text.into();
    }

    pub fn deep_memory(&self) -> &str {
        &self.deep_memory
    }

    // ── Compression bookkeeping ──

    /// Count one completed oracle call towards the compression trigger.
    pub fn track_api_call(&mut self) {
        if self.compression_enabled {
            self.metadata.total_api_calls += 1;
        }
    }

    pub fn compression_enabled(&self) -> bool {
        self.compression_enabled
    }

    pub fn metadata(&self) -> &CompressionMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Language;

    fn limits(short: usize, detailed: usize) -> StoreLimits {
        StoreLimits {
            short_term_capacity: short,
            detailed_capacity: detailed,
            compression_enabled: true,
        }
    }

    #[test]
    fn short_term_buffers_evict_independently() {
        let mut store = MemoryStore::new(limits(3, 1));
        for i in 0..5 {
            store.append_short_term(
                ShortTermEntry::new(format!("s{i}")).with_detailed(format!("full turn {i}")),
            );
        }
        let short: Vec<&str> = store.short_term().iter().collect();
        let detailed: Vec<&str> = store.detailed().iter().collect();
        assert_eq!(short, vec!["s2", "s3", "s4"]);
        assert_eq!(detailed, vec!["full turn 4"]);
    }

    #[test]
    fn detailed_buffer_defaults_to_content() {
        let mut store = MemoryStore::default();
        store.append_short_term(ShortTermEntry::new("hello"));
        assert_eq!(store.detailed().iter().next(), Some("hello"));
    }

    #[test]
    fn clear_short_term_keeps_long_term_and_deep_memory() {
        let mut store = MemoryStore::default();
        store.append_short_term(ShortTermEntry::new("recent"));
        store.append_long_term(MemoryItem::new("fact", Language::En));
        store.set_deep_memory("never forget {Mira}");

        store.clear_short_term();

        assert!(store.short_term().is_empty());
        assert!(store.detailed().is_empty());
        assert_eq!(store.long_term_len(), 1);
        assert_eq!(store.deep_memory(), "never forget {Mira}");
    }

    #[test]
    fn long_term_append_counts_only_when_compression_enabled() {
        let mut on = MemoryStore::default();
        on.append_long_term(MemoryItem::new("a", Language::En));
        on.track_api_call();
        assert_eq!(on.metadata().total_api_calls, 2);

        let mut off = MemoryStore::new(StoreLimits {
            compression_enabled: false,
            ..StoreLimits::default()
        });
        off.append_long_term(MemoryItem::new("a", Language::En));
        off.track_api_call();
        assert_eq!(off.metadata().total_api_calls, 0);
        assert_eq!(off.long_term_len(), 1);
    }

    #[test]
    fn track_access_updates_counters() {
        let mut store = MemoryStore::default();
        let item = MemoryItem::new("fact", Language::En);
        let id = item.id.clone();
        store.append_long_term(item);

        let now = Utc::now();
        store.track_access(&id, now).unwrap();
        store.track_access(&id, now).unwrap();

        assert_eq!(store.long_term()[0].access_count, 2);
        assert_eq!(store.long_term()[0].last_accessed, Some(now));
        assert!(store.track_access("missing", now).is_err());
    }

    #[test]
    fn apply_compression_swaps_and_resets_counter() {
        let mut store = MemoryStore::default();
        for i in 0..6 {
            store.append_long_term(MemoryItem::new(format!("fact {i}"), Language::En));
        }
        assert_eq!(store.metadata().total_api_calls, 6);

        let profile = MemoryItem::new("[CHARACTER_IDENTITY:profile] ...", Language::En).compressed();
        store.apply_compression(vec![profile], 6, Utc::now());

        let meta = store.metadata();
        assert_eq!(store.long_term_len(), 1);
        assert_eq!(meta.total_api_calls, 0);
        assert_eq!(meta.compression_count, 1);
        assert_eq!(meta.memories_before_last_compression, 6);
        assert_eq!(meta.memories_after_last_compression, 1);
        assert!(meta.last_compression_time.is_some());
    }

    #[test]
    fn apply_limits_shrinks_buffers() {
        let mut store = MemoryStore::new(limits(5, 2));
        for i in 0..5 {
            store.append_short_term(ShortTermEntry::new(format!("s{i}")));
        }
        store.apply_limits(limits(2, 1));
        let short: Vec<&str> = store.short_term().iter().collect();
        assert_eq!(short, vec!["s3", "s4"]);
        assert_eq!(store.detailed().len(), 1);
    }
}
