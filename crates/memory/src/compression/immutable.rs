//! Immutable-token restoration.
//!
//! Profile text marks facts that must survive summarization verbatim with
//! braces, e.g. `name {Mira}`. The oracle is told to keep them, but nothing
//! enforces that. After every oracle call the expected tokens are diffed
//! against the reply and any that went missing are appended again.

use regex::Regex;
use std::sync::LazyLock;

/// Sections that may receive a restored token, in search order.
pub const SECTION_ORDER: [&str; 7] = [
    "IDENTITY",
    "APPEARANCE",
    "CORE",
    "TRAITS",
    "PERSONALITY",
    "BACKGROUND",
    "PREFERENCES",
];

const SEPARATORS: [char; 4] = [',', ';', '|', '/'];

static BRACED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}\n]+\}").expect("Invalid braced token regex"));

/// One header matcher per section: `IDENTITY:`, `## Identity:`, `**CORE**:`, `- [TRAITS]:`.
static SECTION_HEADERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SECTION_ORDER
        .iter()
        .map(|name| {
            Regex::new(&format!(r"(?i)^[\s#*\-\[]*{name}[\]*\s]*:"))
                .expect("Invalid section header regex")
        })
        .collect()
});

/// Distinct `{...}` tokens in order of first appearance.
pub fn tokens(text: &str) -> Vec<&str> {
    let mut found: Vec<&str> = Vec::new();
    for m in BRACED.find_iter(text) {
        if !found.contains(&m.as_str()) {
            found.push(m.as_str());
        }
    }
    found
}

/// Tokens from `required` that do not occur in `text`.
pub fn missing<'a>(required: &[&'a str], text: &str) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|token| !text.contains(token))
        .collect()
}

/// Re-append every token of `required` missing from `text`.
///
/// Returns the repaired text and the number of tokens restored.
pub fn restore(text: &str, required: &[&str]) -> (String, usize) {
    let dropped = missing(required, text);
    if dropped.is_empty() {
        return (text.to_string(), 0);
    }

    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    for token in &dropped {
        match find_section(&lines) {
            Some((idx, body_start)) => {
                let line = &lines[idx];
                let body = &line[body_start..];
                lines[idx] = append_to_line(line, body, token);
            }
            None => lines.push((*token).to_string()),
        }
    }
    (lines.join("\n"), dropped.len())
}

/// First section line in search order, with the byte offset where its body starts.
fn find_section(lines: &[String]) -> Option<(usize, usize)> {
    SECTION_HEADERS.iter().find_map(|header| {
        lines
            .iter()
            .enumerate()
            .find_map(|(idx, line)| header.find(line).map(|m| (idx, m.end())))
    })
}

fn append_to_line(line: &str, body: &str, token: &str) -> String {
    let line = line.trim_end();
    if body.trim().is_empty() {
        return format!("{line} {token}");
    }
    match dominant_separator(body) {
        sep @ (',' | ';') => format!("{line}{sep} {token}"),
        sep => format!("{line} {sep} {token}"),
    }
}

/// Most frequent separator in `body`. Ties go to the earlier one, none means `,`.
pub fn dominant_separator(body: &str) -> char {
    let mut best = (',', 0usize);
    for sep in SEPARATORS {
        let count = body.matches(sep).count();
        if count > best.1 {
            best = (sep, count);
        }
    }
    best.0
}
