use async_trait::async_trait;
use thiserror::Error;

/// One chat-completion call. `json_mode` asks the provider for a JSON object
/// response where supported.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            model: model.into(),
            temperature: 0.0,
            max_tokens: 512,
            json_mode: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("provider connection failed: {0}")]
    Connect(String),
    #[error("provider call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response was not understood: {0}")]
    InvalidResponse(String),
    #[error("provider is not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Rate limits, server errors, connect failures and timeouts are retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Connect(_) | Self::Timeout { .. } => true,
            Self::Request(_) | Self::InvalidResponse(_) | Self::NotConfigured(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Connect(_) => "connect",
            Self::Timeout { .. } => "timeout",
            Self::Request(_) => "request",
            Self::InvalidResponse(_) => "invalid_response",
            Self::NotConfigured(_) => "not_configured",
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::ProviderError;

    #[test]
    fn only_retryable_failures_are_transient() {
        assert!(ProviderError::Http { status: 429, body: String::new() }.is_transient());
        assert!(ProviderError::Http { status: 503, body: String::new() }.is_transient());
        assert!(ProviderError::Connect("refused".into()).is_transient());
        assert!(ProviderError::Timeout { after_ms: 30_000 }.is_transient());

        assert!(!ProviderError::Http { status: 400, body: String::new() }.is_transient());
        assert!(!ProviderError::Http { status: 401, body: String::new() }.is_transient());
        assert!(!ProviderError::InvalidResponse("no choices".into()).is_transient());
    }
}
