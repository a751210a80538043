//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes per token. Close enough for
//! budgeting a prompt; the provider's own count is authoritative.

use mnemos_core::message::Message;

/// Per-message overhead for role name and delimiters in the wire format.
pub const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    MESSAGE_OVERHEAD + estimate_tokens(&message.content)
}

pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens("test"), 1);
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(100)), 25);
    }

    #[test]
    fn umlauts_count_bytes() {
        // "Grüße" is 7 bytes
        assert_eq!(estimate_tokens("Grüße"), 2);
    }

    #[test]
    fn messages_include_overhead() {
        let msgs = vec![Message::user("hello"), Message::assistant("world")];
        assert_eq!(estimate_message_tokens(&msgs[0]), 6);
        assert_eq!(estimate_messages_tokens(&msgs), 12);
    }
}
