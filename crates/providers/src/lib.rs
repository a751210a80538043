//! LLM provider implementations for Mnemos.
//!
//! All providers implement the `mnemos_core::Provider` trait. [`build_from_config`]
//! assembles the configured backend behind the overload retry wrapper.

pub mod anthropic;
pub mod retry;

use mnemos_config::AppConfig;
use mnemos_core::error::ProviderError;
use mnemos_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicProvider;
pub use retry::RetryProvider;

/// Build the completion provider named by `config.default_provider`.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let base: Arc<dyn Provider> = match config.default_provider.as_str() {
        "anthropic" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                ProviderError::NotConfigured(
                    "No API key: set api_key in config.toml or MNEMOS_API_KEY".into(),
                )
            })?;
            let mut provider = AnthropicProvider::new(api_key)?;
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "Unknown provider '{other}'"
            )));
        }
    };

    Ok(Arc::new(
        RetryProvider::new(base)
            .with_max_retries(config.retry.max_retries)
            .with_base_delay(Duration::from_millis(config.retry.base_delay_ms)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let config = AppConfig::default();
        assert!(matches!(
            build_from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            default_provider: "carrier-pigeon".into(),
            ..AppConfig::default()
        };
        assert!(build_from_config(&config).is_err());
    }

    #[test]
    fn anthropic_is_wrapped_in_retry() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }
}
