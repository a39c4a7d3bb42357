use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use deskpilot_core::config::LlmConfig;

use crate::llm::{CompletionRequest, EmbeddingClient, LlmClient, ProviderError};

/// Bounded exponential backoff plus a hard per-attempt timeout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_retries.saturating_add(1),
            call_timeout: Duration::from_secs(config.timeout_secs),
            ..Self::default()
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Runs `call` until it succeeds, fails permanently, or attempts run out.
    /// An attempt that exceeds `call_timeout` counts as a transient failure.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    after_ms: u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            attempt += 1;
            if !error.is_transient() || attempt >= max_attempts {
                return Err(error);
            }

            warn!(
                event_name = "provider.retry",
                operation,
                attempt,
                max_attempts,
                error_kind = error.kind(),
                error = %error,
                "transient provider failure; backing off"
            );
            let delay = self.backoff(attempt - 1);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Wraps a provider client so every call goes through a [`RetryPolicy`].
pub struct Resilient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> Resilient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for Resilient<C> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.policy.run("chat_completion", || self.inner.complete(request)).await
    }
}

#[async_trait]
impl<C: EmbeddingClient> EmbeddingClient for Resilient<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.policy.run("embedding", || self.inner.embed(text)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::{Resilient, RetryPolicy};
    use crate::fakes::ScriptedLlmClient;
    use crate::llm::{CompletionRequest, LlmClient, ProviderError};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            call_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let client = ScriptedLlmClient::new(vec![
            Err(ProviderError::Http { status: 503, body: "busy".into() }),
            Err(ProviderError::Connect("reset".into())),
            Ok("pronto".to_string()),
        ]);
        let resilient = Resilient::new(client, fast_policy(3));

        let reply = resilient
            .complete(&CompletionRequest::new("m", "oi"))
            .await
            .expect("third attempt succeeds");
        assert_eq!(reply, "pronto");
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), ProviderError> = fast_policy(3)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Http { status: 401, body: "bad key".into() }) }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Http { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), ProviderError> = fast_policy(3)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Http { status: 429, body: String::new() }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_call_times_out_as_transient_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), ProviderError> = fast_policy(2)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Timeout { after_ms: 200 })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy { base_delay_ms: 100, max_delay_ms: 500, ..RetryPolicy::default() };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
    }
}
