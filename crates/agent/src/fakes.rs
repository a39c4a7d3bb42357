//! Scripted provider clients for tests and offline runs.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{CompletionRequest, EmbeddingClient, LlmClient, ProviderError};

/// Replays a fixed sequence of completion results and records every request.
/// An exhausted script answers with an `InvalidResponse` error.
#[derive(Default)]
pub struct ScriptedLlmClient {
    state: Mutex<ScriptedLlmState>,
}

#[derive(Default)]
struct ScriptedLlmState {
    responses: VecDeque<Result<String, ProviderError>>,
    requests: Vec<CompletionRequest>,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            state: Mutex::new(ScriptedLlmState {
                responses: responses.into(),
                requests: Vec::new(),
            }),
        }
    }

    pub fn replying(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|response| Ok((*response).to_string())).collect())
    }

    pub async fn calls(&self) -> usize {
        self.state.lock().await.requests.len()
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().await.requests.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".to_string())))
    }
}

/// Returns the same vector for every input, or a fixed error.
pub struct StaticEmbeddingClient {
    result: Result<Vec<f32>, ProviderError>,
    calls: Mutex<Vec<String>>,
}

impl StaticEmbeddingClient {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { result: Ok(vector), calls: Mutex::new(Vec::new()) }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self { result: Err(error), calls: Mutex::new(Vec::new()) }
    }

    pub async fn inputs(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl EmbeddingClient for StaticEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.lock().await.push(text.to_string());
        self.result.clone()
    }
}
