//! Retrieval: choosing which long-term items go into the next prompt.
//!
//! Two passes over an immutable snapshot:
//!
//! 1. **Coverage.** For USER_IDENTITY, CHARACTER_IDENTITY, RELATIONSHIP and
//!    CONVERSATION_THREADS (in that order) take at most one item whose
//!    subtopic is `core` or `milestones`, preferring the highest importance.
//! 2. **Relevance.** Score everything else with
//!    `0.5·importance + 0.3·recency + 0.2·accessFrequency` and fill up to
//!    `max_items`.
//!
//! When no item carries topic metadata at all (older sessions), a simpler
//! category selector is used instead.

use chrono::{DateTime, Utc};
use mnemos_core::memory::{MemoryItem, TopicGroup};
use mnemos_core::store::MemoryStore;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::categorizer::Categorizer;
use crate::rules::Bucket;

const IMPORTANCE_WEIGHT: f32 = 0.5;
const RECENCY_WEIGHT: f32 = 0.3;
const FREQUENCY_WEIGHT: f32 = 0.2;
/// Items older than this get no recency credit.
const RECENCY_WINDOW_DAYS: f32 = 30.0;
/// Access count at which frequency credit saturates.
const FREQUENCY_SATURATION: f32 = 5.0;

static CATEGORY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\[(appearance|identity|preferences?|relationship)\]")
        .expect("Invalid category tag regex")
});

#[derive(Debug, Clone, Default)]
pub struct RetrievalSelector {
    categorizer: Categorizer,
}

impl RetrievalSelector {
    pub fn new(categorizer: Categorizer) -> Self {
        Self { categorizer }
    }

    /// Indices of the items to surface, in prompt order. Never more than `max_items`.
    pub fn select(&self, items: &[MemoryItem], max_items: usize, now: DateTime<Utc>) -> Vec<usize> {
        if max_items == 0 || items.is_empty() {
            return Vec::new();
        }
        if items.iter().any(MemoryItem::has_topic_metadata) {
            self.select_by_topic(items, max_items, now)
        } else {
            debug!(items = items.len(), "No topic metadata, using category selector");
            self.select_by_category(items, max_items)
        }
    }

    /// Select from the store's long-term list and record the access on each surfaced item.
    pub fn retrieve(&self, store: &mut MemoryStore, max_items: usize, now: DateTime<Utc>) -> Vec<MemoryItem> {
        let snapshot = store.long_term_snapshot();
        let chosen = self.select(&snapshot, max_items, now);

        let mut surfaced = Vec::with_capacity(chosen.len());
        for idx in chosen {
            let mut item = snapshot[idx].clone();
            if let Err(e) = store.track_access(&item.id, now) {
                warn!(error = %e, "Selected item vanished before access could be tracked");
                continue;
            }
            item.track_access(now);
            surfaced.push(item);
        }
        surfaced
    }

    fn select_by_topic(&self, items: &[MemoryItem], max_items: usize, now: DateTime<Utc>) -> Vec<usize> {
        let topics: Vec<_> = items.iter().map(MemoryItem::effective_topic).collect();
        let mut chosen: Vec<usize> = Vec::with_capacity(max_items);

        // Pass 1: guaranteed coverage
        for group in TopicGroup::PRIORITY {
            if chosen.len() >= max_items {
                break;
            }
            let best = items
                .iter()
                .enumerate()
                .filter(|(idx, _)| {
                    topics[*idx].as_ref().is_some_and(|tag| {
                        tag.group == group && (tag.subtopic_is("core") || tag.subtopic_is("milestones"))
                    })
                })
                .max_by(|(_, a), (_, b)| {
                    a.importance
                        .total_cmp(&b.importance)
                        .then(a.timestamp.cmp(&b.timestamp))
                });
            if let Some((idx, _)) = best {
                chosen.push(idx);
            }
        }

        // Pass 2: relevance fill
        let mut rest: Vec<(usize, f32)> = (0..items.len())
            .filter(|idx| !chosen.contains(idx))
            .map(|idx| (idx, relevance_score(&items[idx], now)))
            .collect();
        rest.sort_by(|a, b| b.1.total_cmp(&a.1));

        let room = max_items - chosen.len();
        chosen.extend(rest.into_iter().take(room).map(|(idx, _)| idx));
        chosen
    }

    fn select_by_category(&self, items: &[MemoryItem], max_items: usize) -> Vec<usize> {
        let mut by_recency: Vec<usize> = (0..items.len()).collect();
        by_recency.sort_by(|a, b| items[*b].timestamp.cmp(&items[*a].timestamp));

        let mut chosen: Vec<usize> = Vec::with_capacity(max_items);

        for bucket in Bucket::ORDER {
            if chosen.len() >= max_items {
                return chosen;
            }
            if let Some(idx) = by_recency
                .iter()
                .copied()
                .find(|idx| self.category_of(&items[*idx]) == Some(bucket))
            {
                chosen.push(idx);
            }
        }

        for want_compressed in [true, false] {
            for idx in by_recency.iter().copied() {
                if chosen.len() >= max_items {
                    return chosen;
                }
                if items[idx].compressed == want_compressed && !chosen.contains(&idx) {
                    chosen.push(idx);
                }
            }
        }
        chosen
    }

    fn category_of(&self, item: &MemoryItem) -> Option<Bucket> {
        if let Some(caps) = CATEGORY_TAG.captures(&item.content) {
            return match caps[1].to_ascii_lowercase().as_str() {
                "appearance" => Some(Bucket::Appearance),
                "identity" => Some(Bucket::Identity),
                "relationship" => Some(Bucket::Relationship),
                _ => Some(Bucket::Preferences),
            };
        }
        self.categorizer.infer_bucket(&item.content, item.language)
    }
}

/// `0.5·importance + 0.3·recency + 0.2·accessFrequency`.
pub fn relevance_score(item: &MemoryItem, now: DateTime<Utc>) -> f32 {
    let age_days = (now - item.timestamp).num_seconds() as f32 / 86_400.0;
    let recency = (1.0 - age_days / RECENCY_WINDOW_DAYS).clamp(0.0, 1.0);
    let frequency = (item.access_count as f32 / FREQUENCY_SATURATION).min(1.0);
    IMPORTANCE_WEIGHT * item.importance + RECENCY_WEIGHT * recency + FREQUENCY_WEIGHT * frequency
}
