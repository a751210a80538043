//! Retry wrapper: exponential backoff on the "overloaded" signal only.
//!
//! Wraps any provider. An [`ProviderError::Overloaded`] reply is retried after
//! `base_delay`, `2·base_delay`, `4·base_delay`, ... up to `max_retries`
//! times. Every other error is returned immediately.

use async_trait::async_trait;
use mnemos_core::error::ProviderError;
use mnemos_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryProvider {
    /// Wrap `inner` with 3 retries at 2s, 4s, 8s.
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            inner,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut retry = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => {
                    if retry > 0 {
                        info!(provider = self.inner.name(), retries = retry, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_overloaded() && retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    warn!(
                        provider = self.inner.name(),
                        retry = retry + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider overloaded, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemos_core::message::Message;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted results, then succeeds.
    struct ScriptedProvider {
        script: Mutex<VecDeque<ProviderError>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedProvider {
        fn failing_with(errors: Vec<ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(errors.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.calls.lock().unwrap().push(Instant::now());
            match self.script.lock().unwrap().pop_front() {
                Some(e) => Err(e),
                None => Ok(ProviderResponse {
                    message: Message::assistant("success"),
                    usage: None,
                    model: "test-model".into(),
                    stop_reason: None,
                }),
            }
        }
    }

    fn overloaded() -> ProviderError {
        ProviderError::Overloaded("overloaded_error".into())
    }

    fn test_request() -> ProviderRequest {
        ProviderRequest::new("test", vec![Message::user("hello")])
    }

    #[test]
    fn delays_double() {
        let provider = RetryProvider::new(ScriptedProvider::failing_with(vec![]));
        assert_eq!(provider.delay_for(0), Duration::from_secs(2));
        assert_eq!(provider.delay_for(1), Duration::from_secs(4));
        assert_eq!(provider.delay_for(2), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn overloaded_is_retried_with_backoff() {
        let inner = ScriptedProvider::failing_with(vec![overloaded(), overloaded()]);
        let provider = RetryProvider::new(inner.clone());

        let start = Instant::now();
        let result = provider.complete(test_request()).await;
        assert_eq!(result.unwrap().message.content, "success");
        assert_eq!(inner.calls(), 3);

        let times = inner.call_times();
        assert_eq!(times[1] - times[0], Duration::from_secs(2));
        assert_eq!(times[2] - times[1], Duration::from_secs(4));
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let inner = ScriptedProvider::failing_with(vec![overloaded(); 5]);
        let provider = RetryProvider::new(inner.clone());

        let start = Instant::now();
        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(err.is_overloaded());
        assert_eq!(inner.calls(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_terminal() {
        for error in [
            ProviderError::ApiError {
                status_code: 500,
                message: "Internal Server Error".into(),
            },
            ProviderError::RateLimited { retry_after_secs: 60 },
            ProviderError::Network("conn refused".into()),
        ] {
            let inner = ScriptedProvider::failing_with(vec![error]);
            let provider = RetryProvider::new(inner.clone());
            assert!(provider.complete(test_request()).await.is_err());
            assert_eq!(inner.calls(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_disables_backoff() {
        let inner = ScriptedProvider::failing_with(vec![overloaded()]);
        let provider = RetryProvider::new(inner.clone()).with_max_retries(0);
        assert!(provider.complete(test_request()).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn name_is_delegated() {
        let provider = RetryProvider::new(ScriptedProvider::failing_with(vec![]))
            .with_base_delay(Duration::from_millis(10));
        assert_eq!(provider.name(), "scripted");
        assert_eq!(provider.delay_for(3), Duration::from_millis(80));
    }
}
