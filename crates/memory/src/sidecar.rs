//! Sidecar extraction: the JSON object the model appends to every reply.
//!
//! The completion oracle is told to end each answer with:
//!
//! ```text
//! {
//!   "memorize-long-term": {"char": "...", "user": "..."},
//!   "memorize-short-term": "...",
//!   "clothing": {"char": "...", "user": "..."},
//!   "history": "...",
//!   "location": "...",
//!   "date": "YYYY-MM-DD"
//! }
//! ```
//!
//! The object is often cut off by the output-length limit. [`extract`] first
//! tries a strict parse and then falls back to scanning loose `"key": value`
//! pairs.
//!
//! # Limitations
//!
//! The pair scanner does not track nesting. `char`/`user` pairs are assigned
//! by position: the first two go to `memorize-long-term`, any later ones to
//! `clothing`. A truncated object whose long-term block was omitted will
//! therefore file clothing under long-term memory. Callers must treat the
//! result as best-effort.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

pub const KEY_LONG_TERM: &str = "memorize-long-term";
pub const KEY_SHORT_TERM: &str = "memorize-short-term";
pub const KEY_CLOTHING: &str = "clothing";
pub const KEY_HISTORY: &str = "history";
pub const KEY_LOCATION: &str = "location";
pub const KEY_DATE: &str = "date";

/// Loose pairs assigned to `memorize-long-term` before the rest go to `clothing`.
const LONG_TERM_PAIR_SLOTS: usize = 2;

static PAIR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""([^"\\]+)"\s*:\s*("(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?|true|false|null)"#,
    )
    .expect("Invalid sidecar pair regex")
});

/// A JSON-looking object (one nesting level) that ends the text.
static TRAILING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*"(?:[^{}]|\{[^{}]*\})*\}\s*$"#).expect("Invalid trailing block regex")
});

/// `{` followed by a known sidecar key: where a sidecar begins, closed or not.
static SIDECAR_OPENING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\{\s*"(?:memorize-long-term|memorize-short-term|clothing|history|location|date)"\s*:"#,
    )
    .expect("Invalid sidecar opening regex")
});

/// Pull the sidecar object out of a reply. Returns an empty map when there is none.
pub fn extract(text: &str) -> Map<String, Value> {
    let Some(start) = text.find('{') else {
        return Map::new();
    };
    if let Some(map) = strict_object(text) {
        return map;
    }

    let map = scan_pairs(&text[start..]);
    debug!(keys = map.len(), "Sidecar was not valid JSON, recovered loose pairs");
    map
}

/// A complete object that ends the text. Failing that, a complete sidecar
/// followed by trailing prose.
///
/// Candidates start at each `{` up to the first sidecar opening, so a valid
/// object inside the prose (`{}`) or nested inside a truncated sidecar is
/// never mistaken for the whole sidecar.
fn strict_object(text: &str) -> Option<Map<String, Value>> {
    let limit = SIDECAR_OPENING.find(text).map_or(text.len(), |m| m.start());
    let mut with_trailing_prose = None;

    for (idx, _) in text.match_indices('{').take_while(|(idx, _)| *idx <= limit) {
        let candidate = &text[idx..];
        let mut values = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
        let Some(Ok(Value::Object(map))) = values.next() else {
            continue;
        };
        if candidate[values.byte_offset()..].trim().is_empty() {
            return Some(map);
        }
        if idx == limit {
            with_trailing_prose = Some(map);
        }
    }
    with_trailing_prose
}

fn scan_pairs(text: &str) -> Map<String, Value> {
    let mut top = Map::new();
    let mut long_term = Map::new();
    let mut clothing = Map::new();
    let mut nested_seen = 0usize;

    for caps in PAIR_PATTERN.captures_iter(text) {
        let key = caps[1].to_string();
        let value = parse_scalar(&caps[2]);

        if key == "char" || key == "user" {
            if nested_seen < LONG_TERM_PAIR_SLOTS {
                long_term.insert(key, value);
            } else {
                clothing.insert(key, value);
            }
            nested_seen += 1;
        } else {
            top.insert(key, value);
        }
    }

    if !long_term.is_empty() {
        top.insert(KEY_LONG_TERM.into(), Value::Object(long_term));
    }
    if !clothing.is_empty() {
        top.insert(KEY_CLOTHING.into(), Value::Object(clothing));
    }
    top
}

fn parse_scalar(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| {
        Value::String(raw.trim_matches('"').to_string())
    })
}

/// Remove the trailing sidecar so the visible reply excludes bookkeeping.
///
/// Braces inside the prose itself (`*grins* {waves}`) are kept. The result is
/// trimmed of trailing whitespace whether or not a sidecar was found.
pub fn strip_sidecar(text: &str) -> String {
    let trimmed = text.trim_end();

    let opening = SIDECAR_OPENING.find(trimmed).map(|m| m.start());
    let closed = if trimmed.ends_with('}') {
        trailing_object_start(trimmed)
    } else {
        None
    };
    // A truncated sidecar can end in a complete nested object; the outer
    // opening wins over it.
    let cut = match (opening, closed) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    match cut {
        Some(idx) => trimmed[..idx].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

fn trailing_object_start(text: &str) -> Option<usize> {
    text.match_indices('{')
        .map(|(idx, _)| idx)
        .find(|&idx| matches!(serde_json::from_str::<Value>(&text[idx..]), Ok(Value::Object(_))))
        .or_else(|| TRAILING_BLOCK.find(text).map(|m| m.start()))
}

/// The typed state changes carried by one sidecar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidecarUpdate {
    pub long_term_char: Option<String>,
    pub long_term_user: Option<String>,
    pub short_term: Option<String>,
    pub clothing_char: Option<String>,
    pub clothing_user: Option<String>,
    pub history: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
}

impl SidecarUpdate {
    /// Read the known keys. Empty strings and non-string values are ignored.
    ///
    /// A bare string under `memorize-long-term` is treated as a user fact.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let (long_term_char, long_term_user) = match map.get(KEY_LONG_TERM) {
            Some(Value::Object(obj)) => (text_of(obj.get("char")), text_of(obj.get("user"))),
            other => (None, text_of(other)),
        };
        let (clothing_char, clothing_user) = match map.get(KEY_CLOTHING) {
            Some(Value::Object(obj)) => (text_of(obj.get("char")), text_of(obj.get("user"))),
            _ => (None, None),
        };

        Self {
            long_term_char,
            long_term_user,
            short_term: text_of(map.get(KEY_SHORT_TERM)),
            clothing_char,
            clothing_user,
            history: text_of(map.get(KEY_HISTORY)),
            location: text_of(map.get(KEY_LOCATION)),
            date: text_of(map.get(KEY_DATE)),
        }
    }

    /// Extract and type in one step.
    pub fn parse(text: &str) -> Self {
        Self::from_map(&extract(text))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
