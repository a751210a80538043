//! `mnemos compress`: force compression outside the per-turn trigger.

use super::chat::describe_compression;
use super::{CommandResult, build_engine, load_config};

pub async fn run(session_id: &str) -> CommandResult {
    let config = load_config()?;
    let engine = build_engine(&config)?;

    let Some(session) = engine.session(session_id).await? else {
        return Err(format!("Session '{session_id}' not found").into());
    };
    println!(
        "  Compressing {} long-term memories of '{session_id}'...",
        session.memory.long_term_len()
    );

    let outcome = engine.compress_now(session_id).await?;
    println!("  {}", describe_compression(&outcome));
    if !outcome.is_compressed() {
        return Err("Compression did not complete".into());
    }
    Ok(())
}
