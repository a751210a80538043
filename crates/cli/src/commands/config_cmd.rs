//! `mnemos config`: configuration management commands.

use mnemos_config::AppConfig;

use super::CommandResult;

pub async fn validate() -> CommandResult {
    println!("  Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.has_api_key() {
                warnings.push("No API key set (set ANTHROPIC_API_KEY or MNEMOS_API_KEY)");
            }
            if config.compression.threshold == 0 {
                warnings.push("compression.threshold = 0 compresses after every qualifying turn");
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Provider:     {}", config.default_provider);
            println!("   Model:        {}", config.default_model);
            println!("   Compression:  every {} calls above {} memories ({})",
                config.compression.frequency,
                config.compression.threshold,
                if config.compression.enabled { "enabled" } else { "disabled" },
            );
            println!("   Sessions:     {} ({})", config.persistence.backend, config.sessions_dir().display());
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> CommandResult {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

pub async fn path() -> CommandResult {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
    Ok(())
}

pub async fn defaults() -> CommandResult {
    println!("{}", AppConfig::default_toml());
    Ok(())
}
