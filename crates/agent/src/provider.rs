//! OpenAI-compatible HTTP provider (`/chat/completions`, `/embeddings`).
//!
//! Works against OpenAI itself and against Ollama's compatibility endpoint.
//! Retries and hard timeouts are layered on top via [`crate::resilience`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use deskpilot_core::config::AppConfig;

use crate::llm::{CompletionRequest, EmbeddingClient, LlmClient, ProviderError};

const MAX_ERROR_BODY_CHARS: usize = 512;

pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    embedding_model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        embedding_model: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|error| ProviderError::NotConfigured(format!("http client: {error}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            embedding_model: embedding_model.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        Self::new(
            config.llm_base_url(),
            config.llm.api_key.clone(),
            config.llm.embedding_model.clone(),
            Duration::from_secs(config.llm.timeout_secs.clamp(1, 10)),
        )
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

fn chat_body(request: &CompletionRequest) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system.as_deref() {
        messages.push(ChatMessage { role: "system", content: system });
    }
    messages.push(ChatMessage { role: "user", content: &request.prompt });

    let mut body = serde_json::json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });
    if request.json_mode {
        body["response_format"] = serde_json::json!({ "type": "json_object" });
    }
    body
}

fn map_send_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout { after_ms: 0 }
    } else if error.is_connect() {
        ProviderError::Connect(error.to_string())
    } else {
        ProviderError::Request(error.to_string())
    }
}

async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Http {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        debug!(
            event_name = "provider.chat_completion",
            model = %request.model,
            json_mode = request.json_mode,
            "sending chat completion"
        );
        let response = self
            .post("/chat/completions")
            .json(&chat_body(request))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse(error.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("completion had no content".to_string()))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiCompatibleClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        debug!(
            event_name = "provider.embedding",
            model = %self.embedding_model,
            input_chars = text.chars().count(),
            "requesting embedding"
        );
        let response = self
            .post("/embeddings")
            .json(&serde_json::json!({ "model": self.embedding_model, "input": text }))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse(error.to_string()))?;

        match payload.data.into_iter().next() {
            Some(datum) if !datum.embedding.is_empty() => Ok(datum.embedding),
            _ => Err(ProviderError::InvalidResponse("embedding response was empty".to_string())),
        }
    }
}
