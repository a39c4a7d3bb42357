//! Decision engine: model-backed ticket classification and grounded answers.
//!
//! The model is never trusted directly. Its output passes through a strict
//! decode step, team ids are checked against the live roster, priorities go
//! through the normalizer, and generated answers pass a usefulness gate.
//! Every failure path degrades (classification) or declines (retrieval).
//!
//! # Modules
//!
//! - `llm` / `provider` / `resilience`: provider seams, the OpenAI-compatible
//!   HTTP client and retry/timeout wrapping
//! - `prompts` / `decode`: rendering model input and decoding model output
//! - `classifier`, `retrieval`, `indexer`: the engines
//! - `guardrails`: answer usefulness gate
//! - `fakes`: scripted clients for tests and offline runs

pub mod classifier;
pub mod decode;
pub mod fakes;
pub mod guardrails;
pub mod indexer;
pub mod llm;
pub mod prompts;
pub mod provider;
pub mod resilience;
pub mod retrieval;
pub mod text;

pub use classifier::ClassificationEngine;
pub use indexer::{KnowledgeIndexer, ReindexReport};
pub use llm::{CompletionRequest, EmbeddingClient, LlmClient, ProviderError};
pub use prompts::{PromptBuilder, PromptError};
pub use provider::OpenAiCompatibleClient;
pub use resilience::{Resilient, RetryPolicy};
pub use retrieval::{AnswerEngine, RetrievalEngine};
