//! Summarization oracle backed by a completion [`Provider`].

use async_trait::async_trait;
use mnemos_core::error::OracleError;
use mnemos_core::memory::{Language, MemoryItem};
use mnemos_core::message::Message;
use mnemos_core::oracle::SummarizationOracle;
use mnemos_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tracing::debug;

use super::prompts;

const SUMMARY_TEMPERATURE: f32 = 0.2;

pub struct ProviderSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    language: Language,
    profile_byte_limit: usize,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 2048,
            language: Language::En,
            profile_byte_limit: super::DEFAULT_PROFILE_BYTE_LIMIT,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_profile_byte_limit(mut self, limit: usize) -> Self {
        self.profile_byte_limit = limit;
        self
    }

    async fn ask(&self, instructions: String, body: String) -> Result<String, OracleError> {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(instructions), Message::user(body)],
        )
        .with_temperature(SUMMARY_TEMPERATURE)
        .with_max_tokens(self.max_tokens);

        let response = self.provider.complete(request).await?;
        let text = response.message.content.trim().to_string();
        debug!(
            provider = self.provider.name(),
            reply_bytes = text.len(),
            "Summarization oracle replied"
        );
        if text.is_empty() {
            return Err(OracleError::EmptyReply);
        }
        Ok(text)
    }
}

#[async_trait]
impl SummarizationOracle for ProviderSummarizer {
    async fn consolidate(
        &self,
        items: &[MemoryItem],
        character_profile: &str,
        user_profile: &str,
    ) -> Result<String, OracleError> {
        self.ask(
            prompts::consolidation_instructions(self.language),
            prompts::consolidation_request(items, character_profile, user_profile),
        )
        .await
    }

    async fn compress_profile(&self, profile: &str) -> Result<String, OracleError> {
        self.ask(
            prompts::profile_compression_instructions(self.language, self.profile_byte_limit),
            profile.to_string(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemos_core::error::ProviderError;
    use mnemos_core::message::Role;
    use mnemos_core::provider::ProviderResponse;
    use std::sync::Mutex;

    struct RecordingProvider {
        reply: Result<String, ProviderError>,
        seen: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.seen.lock().unwrap().push(request);
            self.reply.clone().map(|text| ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: "test-model".into(),
                stop_reason: None,
            })
        }
    }

    fn provider(reply: Result<String, ProviderError>) -> Arc<RecordingProvider> {
        Arc::new(RecordingProvider {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn consolidate_sends_contract_and_material() {
        let p = provider(Ok("  IDENTITY: {Mira}\n=== USER PROFILE ===\nIDENTITY: {Alex}  ".into()));
        let summarizer = ProviderSummarizer::new(p.clone(), "summary-model").with_max_tokens(512);
        let items = vec![MemoryItem::new("likes tea", Language::En)];

        let reply = summarizer.consolidate(&items, "IDENTITY: {Mira}", "").await.unwrap();
        assert!(reply.starts_with("IDENTITY: {Mira}"));
        assert!(reply.ends_with("{Alex}"));

        let seen = p.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.model, "summary-model");
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[1].content.contains("- likes tea"));
    }

    #[tokio::test]
    async fn blank_reply_is_an_error() {
        let summarizer = ProviderSummarizer::new(provider(Ok("   ".into())), "m");
        let err = summarizer.compress_profile("IDENTITY: x").await.unwrap_err();
        assert!(matches!(err, OracleError::EmptyReply));
    }

    #[tokio::test]
    async fn provider_failure_is_wrapped() {
        let summarizer = ProviderSummarizer::new(
            provider(Err(ProviderError::ApiError {
                status_code: 500,
                message: "boom".into(),
            })),
            "m",
        );
        let err = summarizer.compress_profile("IDENTITY: x").await.unwrap_err();
        assert!(matches!(
            err,
            OracleError::Call(ProviderError::ApiError { status_code: 500, .. })
        ));
    }
}
