//! `mnemos extract`: run sidecar extraction on stdin, for debugging replies.

use mnemos_memory::{SidecarUpdate, extract, strip_sidecar};
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;

use super::CommandResult;

pub async fn run() -> CommandResult {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    println!("{}", serde_json::to_string_pretty(&report(&input))?);
    Ok(())
}

/// Raw sidecar, the reply without it, and which fields a turn would apply.
fn report(text: &str) -> Value {
    let sidecar = extract(text);
    let update = SidecarUpdate::from_map(&sidecar);
    json!({
        "sidecar": sidecar,
        "reply": strip_sidecar(text),
        "applies": {
            "long_term_char": update.long_term_char,
            "long_term_user": update.long_term_user,
            "short_term": update.short_term,
            "clothing_char": update.clothing_char,
            "clothing_user": update.clothing_user,
            "history": update.history,
            "location": update.location,
            "date": update.date,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_sidecar_is_reported_best_effort() {
        let report = report(
            r#"*waves* Hello!
{"memorize-short-term": "hi", "clothing": {"char": "jeans""#,
        );
        assert_eq!(report["reply"], "*waves* Hello!");
        assert_eq!(report["sidecar"]["memorize-short-term"], "hi");
        assert_eq!(report["applies"]["short_term"], "hi");
    }

    #[test]
    fn plain_text_has_empty_sidecar() {
        let report = report("Just talking.");
        assert_eq!(report["sidecar"], json!({}));
        assert_eq!(report["reply"], "Just talking.");
        assert!(report["applies"]["location"].is_null());
    }
}
