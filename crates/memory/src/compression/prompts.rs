//! Instruction contract for the summarization oracle.

use mnemos_core::memory::{Language, MemoryItem};
use mnemos_core::oracle::PROFILE_DELIMITER;

use super::immutable::SECTION_ORDER;

/// Optional header the oracle sometimes echoes before the character segment.
pub const CHARACTER_HEADER: &str = "=== CHARACTER PROFILE ===";

pub fn consolidation_instructions(language: Language) -> String {
    let sections = SECTION_ORDER.join(", ");
    let mut out = format!(
        "You maintain the long-term memory of a roleplay conversation.\n\
         Merge the current profiles and the remembered facts below into two compact profiles.\n\
         \n\
         Rules:\n\
         - Use symbolic, compact notation. No prose, no repetition.\n\
         - Organize each profile into sections named {sections}, plus RELATIONSHIP and THREADS when relevant. Write each section as `NAME: item, item, item`.\n\
         - Text inside braces like {{this}} is immutable. Copy every braced fragment verbatim, braces included.\n\
         - Newer facts override older ones unless the older one is braced.\n\
         - Output the character profile first, then a line containing exactly `{PROFILE_DELIMITER}`, then the user profile. Nothing else.\n"
    );
    if language == Language::De {
        out.push_str("- Write both profiles in German.\n");
    }
    out
}

/// The user message carrying the material to consolidate.
pub fn consolidation_request(items: &[MemoryItem], character_profile: &str, user_profile: &str) -> String {
    let facts: String = items
        .iter()
        .map(|item| format!("- {} (importance {:.2})\n", item.content, item.importance))
        .collect();
    format!(
        "CURRENT CHARACTER PROFILE:\n{}\n\nCURRENT USER PROFILE:\n{}\n\nREMEMBERED FACTS ({}):\n{facts}",
        or_none(character_profile),
        or_none(user_profile),
        items.len()
    )
}

pub fn profile_compression_instructions(language: Language, byte_limit: usize) -> String {
    let mut out = format!(
        "Shorten the following profile to well under {byte_limit} bytes.\n\
         Keep the section names and the `NAME: item, item` layout. Drop redundant or trivial detail first.\n\
         Text inside braces like {{this}} is immutable. Copy every braced fragment verbatim, braces included.\n\
         Reply with the shortened profile only.\n"
    );
    if language == Language::De {
        out.push_str("Write the profile in German.\n");
    }
    out
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() { "(none)" } else { text }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consolidation_contract_names_delimiter_and_braces() {
        let text = consolidation_instructions(Language::En);
        assert!(text.contains(PROFILE_DELIMITER));
        assert!(text.contains("{this}"));
        assert!(text.contains("IDENTITY, APPEARANCE, CORE"));
        assert!(!text.contains("German"));
        assert!(consolidation_instructions(Language::De).contains("German"));
    }

    #[test]
    fn request_lists_every_item() {
        let items = vec![
            MemoryItem::new("[USER_IDENTITY:core] name {Alex}", Language::En).with_importance(0.8),
            MemoryItem::new("likes tea", Language::En),
        ];
        let text = consolidation_request(&items, "", "IDENTITY: {Alex}");
        assert!(text.contains("CURRENT CHARACTER PROFILE:\n(none)"));
        assert!(text.contains("IDENTITY: {Alex}"));
        assert!(text.contains("REMEMBERED FACTS (2):"));
        assert!(text.contains("- [USER_IDENTITY:core] name {Alex} (importance 0.80)"));
        assert!(text.contains("- likes tea (importance 0.50)"));
    }

    #[test]
    fn empty_request_keeps_its_section_layout() {
        assert_eq!(
            consolidation_request(&[], " ", ""),
            "CURRENT CHARACTER PROFILE:\n(none)\n\nCURRENT USER PROFILE:\n(none)\n\nREMEMBERED FACTS (0):\n"
        );
    }
}
