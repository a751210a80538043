//! `mnemos sessions`: inspect and delete stored sessions.

use mnemos_core::persistence::validate_session_id;

use super::{CommandResult, load_config, open_sessions};

pub async fn list() -> CommandResult {
    let config = load_config()?;
    let store = open_sessions(&config)?;
    let sessions = store.list().await?;

    if sessions.is_empty() {
        println!("  No sessions stored in {}", config.sessions_dir().display());
        return Ok(());
    }
    println!("  {:<32} {}", "SESSION", "LAST UPDATED");
    for summary in sessions {
        println!(
            "  {:<32} {}",
            summary.session_id,
            summary.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

pub async fn show(session_id: &str) -> CommandResult {
    validate_session_id(session_id)?;
    let config = load_config()?;
    let store = open_sessions(&config)?;
    match store.load(session_id).await? {
        Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
        None => return Err(format!("Session '{session_id}' not found").into()),
    }
    Ok(())
}

pub async fn delete(session_id: &str) -> CommandResult {
    validate_session_id(session_id)?;
    let config = load_config()?;
    let store = open_sessions(&config)?;
    if store.delete(session_id).await? {
        println!("  Deleted session '{session_id}'");
    } else {
        println!("  Session '{session_id}' did not exist");
    }
    Ok(())
}
