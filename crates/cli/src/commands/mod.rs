pub mod chat;
pub mod compress;
pub mod config_cmd;
pub mod extract;
pub mod sessions;

use mnemos_agent::ConversationEngine;
use mnemos_config::AppConfig;
use mnemos_core::persistence::SessionStore;
use std::sync::Arc;
use tracing::debug;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub fn open_sessions(config: &AppConfig) -> Result<Arc<dyn SessionStore>, Box<dyn std::error::Error>> {
    debug!(
        backend = %config.persistence.backend,
        dir = %config.sessions_dir().display(),
        "Opening session store"
    );
    Ok(mnemos_memory::open_store(
        &config.persistence.backend,
        config.sessions_dir(),
        config.persistence.cache_capacity,
    )?)
}

/// Engine wired to the configured provider and session store.
pub fn build_engine(config: &AppConfig) -> Result<ConversationEngine, Box<dyn std::error::Error>> {
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ANTHROPIC_API_KEY = 'sk-ant-...'");
        eprintln!("    MNEMOS_API_KEY    = 'sk-ant-...'");
        eprintln!();
        eprintln!("  Or add `api_key` to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }
    let provider = mnemos_providers::build_from_config(config)?;
    debug!(model = %config.default_model, "Provider ready");
    let store = open_sessions(config)?;
    Ok(ConversationEngine::from_config(config, provider, store))
}
