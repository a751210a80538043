//! Context assembly: turns a session's memory tiers into one prompt.
//!
//! Layers, in the order they are filled:
//!
//! 1. **Character profile + sidecar instructions + deep memory**: never trimmed
//! 2. **User profile**: kept whole or dropped whole
//! 3. **Scene** (location, date, clothing): kept whole or dropped whole
//! 4. **Long-term memory** (retrieved items, best first): lowest-ranked dropped
//! 5. **Relationship history**: oldest milestones dropped
//! 6. **Short-term summaries**: oldest dropped
//! 7. **Recent turns** (detailed buffer): oldest dropped
//!
//! Assembly is deterministic: identical inputs produce identical output.

use crate::context::token;
pub use mnemos_core::error::AssemblyError;
use mnemos_core::memory::MemoryItem;
use mnemos_core::message::Message;
use mnemos_core::session::Session;
use mnemos_memory::compression::PROFILE_SUBTOPIC;
use serde::{Deserialize, Serialize};

/// Appended to every system prompt so the reply carries a sidecar.
pub const SIDECAR_INSTRUCTIONS: &str = r#"After your reply, append a single JSON object on its own lines with what should be remembered:
{
  "memorize-long-term": {"char": "<new lasting facts about you>", "user": "<new lasting facts about the user>"},
  "memorize-short-term": "<one-line summary of this turn>",
  "clothing": {"char": "<what you wear>", "user": "<what the user wears>"},
  "history": "<relationship milestone, if any>",
  "location": "<current location>",
  "date": "YYYY-MM-DD"
}
Leave out keys that did not change. Wrap names and other facts that must never change in {braces}."#;

/// Token budget configuration.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    /// Total token budget for the assembled context.
    pub total: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self { total: 8192 }
    }
}

/// Everything the assembler reads for one turn.
pub struct AssemblyInput<'a> {
    pub session: &'a Session,
    /// Long-term items chosen by the retrieval selector, best first.
    pub memories: &'a [MemoryItem],
    /// The current user message.
    pub user_message: &'a str,
}

/// The assembled context, ready for a completion call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub system_message: String,
    /// The current user message. Earlier turns live in the system message.
    pub messages: Vec<Message>,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    /// System message first, then the conversation messages.
    pub fn into_messages(self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(Message::system(self.system_message));
        messages.extend(self.messages);
        messages
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub total_tokens: usize,
    pub budget: usize,
    /// Budget utilization percentage (0.0–100.0).
    pub utilization_pct: f32,
    pub per_layer: Vec<LayerStats>,
    pub drops: Vec<DropInfo>,
}

impl AssemblyMetadata {
    pub fn layer(&self, name: &str) -> Option<&LayerStats> {
        self.per_layer.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items dropped from a layer during budget enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

/// Which end of a list survives trimming.
#[derive(Clone, Copy)]
enum Keep {
    /// Items are ranked; keep from the front.
    First,
    /// Items are chronological; keep the newest.
    Newest,
}

/// Stateless. Create one and reuse it.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    budget: TokenBudget,
}

impl ContextAssembler {
    pub fn new(budget: TokenBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    pub fn assemble(&self, input: &AssemblyInput<'_>) -> Result<AssembledContext, AssemblyError> {
        let session = input.session;
        let mut stats = Vec::new();
        let mut drops = Vec::new();

        // ── Fixed layer ──
        let mut fixed = Vec::new();
        if !session.character_profile.trim().is_empty() {
            fixed.push(format!("[Character Profile]\n{}", session.character_profile.trim()));
        }
        fixed.push(SIDECAR_INSTRUCTIONS.to_string());
        let deep = session.memory.deep_memory().trim();
        if !deep.is_empty() {
            fixed.push(format!("[Deep Memory]\n{deep}"));
        }
        let fixed_text = fixed.join("\n\n");
        let system_tokens = token::estimate_tokens(&fixed_text);
        stats.push(LayerStats {
            name: "system".into(),
            tokens: system_tokens,
            items_included: fixed.len(),
            items_total: fixed.len(),
        });

        let user_tokens = token::estimate_tokens(input.user_message) + token::MESSAGE_OVERHEAD;
        let reserved = system_tokens + user_tokens;
        if reserved > self.budget.total {
            return Err(AssemblyError::BudgetExceeded {
                system_tokens,
                user_tokens,
                budget: self.budget.total,
            });
        }
        let mut remaining = self.budget.total - reserved;

        // ── Whole-or-nothing layers ──
        let user_profile = session.user_profile.trim();
        let user_section = (!user_profile.is_empty()).then(|| format!("[User Profile]\n{user_profile}"));
        let user_section = Self::whole_layer("user_profile", user_section, &mut remaining, &mut stats, &mut drops);

        let scene_section = Self::whole_layer(
            "scene",
            render_scene(session),
            &mut remaining,
            &mut stats,
            &mut drops,
        );

        // ── Trimmable lists ──
        let memory_lines: Vec<String> = input
            .memories
            .iter()
            .filter(|item| !is_profile_item(item))
            .map(|item| format!("- {}\n", item.content.trim()))
            .collect();
        let memory_section = Self::list_layer(
            "long_term_memory",
            "[Long-Term Memory]\n",
            memory_lines,
            Keep::First,
            "Lowest-ranked memories dropped",
            &mut remaining,
            &mut stats,
            &mut drops,
        );

        let history_lines: Vec<String> = session
            .history
            .iter()
            .map(|h| format!("- {} ({})\n", h.change, h.timestamp.format("%Y-%m-%d")))
            .collect();
        let history_section = Self::list_layer(
            "history",
            "[Relationship History]\n",
            history_lines,
            Keep::Newest,
            "Oldest milestones dropped",
            &mut remaining,
            &mut stats,
            &mut drops,
        );

        let short_lines: Vec<String> = session
            .memory
            .short_term()
            .iter()
            .map(|s| format!("- {s}\n"))
            .collect();
        let short_section = Self::list_layer(
            "short_term",
            "[Recent Events]\n",
            short_lines,
            Keep::Newest,
            "Oldest summaries dropped",
            &mut remaining,
            &mut stats,
            &mut drops,
        );

        let turn_lines: Vec<String> = session
            .memory
            .detailed()
            .iter()
            .map(|t| format!("{}\n\n", t.trim()))
            .collect();
        let turns_section = Self::list_layer(
            "recent_turns",
            "[Last Turns]\n",
            turn_lines,
            Keep::Newest,
            "Oldest turns dropped",
            &mut remaining,
            &mut stats,
            &mut drops,
        );

        // ── Final system message, in reading order ──
        let mut sections = vec![fixed_text];
        sections.extend(
            [
                user_section,
                scene_section,
                memory_section,
                history_section,
                short_section,
                turns_section,
            ]
            .into_iter()
            .flatten(),
        );
        let system_message = sections.join("\n\n");

        stats.push(LayerStats {
            name: "user_message".into(),
            tokens: user_tokens,
            items_included: 1,
            items_total: 1,
        });
        let total_tokens: usize = stats.iter().map(|s| s.tokens).sum();
        let utilization_pct = if self.budget.total == 0 {
            0.0
        } else {
            (total_tokens as f32 / self.budget.total as f32) * 100.0
        };

        Ok(AssembledContext {
            system_message,
            messages: vec![Message::user(input.user_message)],
            metadata: AssemblyMetadata {
                total_tokens,
                budget: self.budget.total,
                utilization_pct,
                per_layer: stats,
                drops,
            },
        })
    }

    fn whole_layer(
        layer: &str,
        section: Option<String>,
        remaining: &mut usize,
        stats: &mut Vec<LayerStats>,
        drops: &mut Vec<DropInfo>,
    ) -> Option<String> {
        let Some(section) = section else {
            stats.push(empty_stats(layer, 0));
            return None;
        };
        let tokens = token::estimate_tokens(&section);
        if tokens <= *remaining {
            *remaining -= tokens;
            stats.push(LayerStats {
                name: layer.into(),
                tokens,
                items_included: 1,
                items_total: 1,
            });
            Some(section)
        } else {
            stats.push(empty_stats(layer, 1));
            drops.push(DropInfo {
                layer: layer.into(),
                items_dropped: 1,
                tokens_dropped: tokens,
                reason: "Layer does not fit the remaining budget".into(),
            });
            None
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn list_layer(
        layer: &str,
        header: &str,
        lines: Vec<String>,
        keep: Keep,
        reason: &str,
        remaining: &mut usize,
        stats: &mut Vec<LayerStats>,
        drops: &mut Vec<DropInfo>,
    ) -> Option<String> {
        if lines.is_empty() {
            stats.push(empty_stats(layer, 0));
            return None;
        }
        let total = lines.len();
        let header_tokens = token::estimate_tokens(header);

        let order: Vec<usize> = match keep {
            Keep::First => (0..total).collect(),
            Keep::Newest => (0..total).rev().collect(),
        };

        let mut used = header_tokens;
        let mut included = vec![false; total];
        let mut dropped = 0;
        let mut dropped_tokens = 0;
        for idx in order {
            let line_tokens = token::estimate_tokens(&lines[idx]);
            if used + line_tokens <= *remaining {
                included[idx] = true;
                used += line_tokens;
            } else {
                dropped += 1;
                dropped_tokens += line_tokens;
            }
        }

        if dropped > 0 {
            drops.push(DropInfo {
                layer: layer.into(),
                items_dropped: dropped,
                tokens_dropped: dropped_tokens,
                reason: reason.into(),
            });
        }
        if dropped == total {
            stats.push(empty_stats(layer, total));
            return None;
        }

        *remaining -= used;
        stats.push(LayerStats {
            name: layer.into(),
            tokens: used,
            items_included: total - dropped,
            items_total: total,
        });

        let body: String = lines
            .iter()
            .zip(&included)
            .filter(|(_, keep)| **keep)
            .map(|(line, _)| line.as_str())
            .collect();
        Some(format!("{header}{}", body.trim_end()))
    }
}

/// Compressed profile items duplicate the profile sections.
fn is_profile_item(item: &MemoryItem) -> bool {
    item.compressed
        && item
            .effective_topic()
            .is_some_and(|tag| tag.group.is_identity() && tag.subtopic_is(PROFILE_SUBTOPIC))
}

fn render_scene(session: &Session) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(location) = &session.location {
        lines.push(format!("Location: {location}"));
    }
    if let Some(date) = &session.date {
        lines.push(format!("Date: {date}"));
    }
    if let Some(clothing) = &session.clothing.char {
        lines.push(format!("You wear: {clothing}"));
    }
    if let Some(clothing) = &session.clothing.user {
        lines.push(format!("User wears: {clothing}"));
    }
    (!lines.is_empty()).then(|| format!("[Scene]\n{}", lines.join("\n")))
}

fn empty_stats(layer: &str, total: usize) -> LayerStats {
    LayerStats {
        name: layer.into(),
        tokens: 0,
        items_included: 0,
        items_total: total,
    }
}
