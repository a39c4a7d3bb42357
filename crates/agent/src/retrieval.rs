//! Retrieval-augmented answers for inbound questions.
//!
//! Embed, hybrid search, re-rank, filter, generate, gate. Every failure along
//! the way declines to answer; a declined answer means the contact gets no
//! automated reply.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use deskpilot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use deskpilot_core::config::RetrievalConfig;
use deskpilot_core::conversation::ConversationTurn;
use deskpilot_core::domain::knowledge::{Document, HybridQuery, RetrievalCandidate};
use deskpilot_db::repositories::DocumentRepository;

use crate::decode::decode_relevance_scores;
use crate::guardrails::{GuardrailDecision, UsefulnessGate};
use crate::llm::{CompletionRequest, EmbeddingClient, LlmClient};
use crate::prompts::{PromptBuilder, ANSWER_SYSTEM, RERANK_SYSTEM};

const RERANK_MAX_TOKENS: u32 = 400;
const ANSWER_MAX_TOKENS: u32 = 500;
const ANSWER_TEMPERATURE: f32 = 0.2;

#[async_trait]
pub trait AnswerEngine: Send + Sync {
    /// Grounded answer for `query`, or `None` when the engine declines.
    async fn answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
        audit: &AuditContext,
    ) -> Option<String>;
}

/// Candidates that survived filtering, and whether relevance scores backed
/// the selection.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub documents: Vec<Document>,
    pub reranked: bool,
}

pub struct RetrievalEngine {
    embeddings: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
    documents: Arc<dyn DocumentRepository>,
    prompts: PromptBuilder,
    gate: UsefulnessGate,
    config: RetrievalConfig,
    model: String,
    audit: Arc<dyn AuditSink>,
}

impl RetrievalEngine {
    pub fn new(
        embeddings: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        documents: Arc<dyn DocumentRepository>,
        prompts: PromptBuilder,
        model: impl Into<String>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            embeddings,
            llm,
            documents,
            prompts,
            gate: UsefulnessGate::default(),
            config: RetrievalConfig::default(),
            model: model.into(),
            audit,
        }
    }

    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    async fn run(
        &self,
        query: &str,
        history: &[ConversationTurn],
        audit: &AuditContext,
    ) -> Result<String, &'static str> {
        let embedding = self.embeddings.embed(query).await.map_err(|error| {
            debug!(event_name = "retrieval.embed_failed", error = %error, "embedding failed");
            "embedding_failed"
        })?;

        let candidates = self
            .documents
            .hybrid_search(&HybridQuery {
                embedding: &embedding,
                text: query,
                match_count: self.config.match_count,
                alpha: self.config.alpha,
            })
            .await
            .map_err(|error| {
                debug!(event_name = "retrieval.search_failed", error = %error, "hybrid search failed");
                "search_failed"
            })?;
        if candidates.is_empty() {
            return Err("no_candidates");
        }

        let selection = self.rerank_and_select(query, candidates).await?;
        if selection.documents.is_empty() {
            return Err("below_relevance_threshold");
        }
        debug!(
            event_name = "retrieval.selected",
            correlation_id = %audit.correlation_id,
            documents = selection.documents.len(),
            reranked = selection.reranked,
            "documents selected for generation"
        );

        let turns = &history[history.len().saturating_sub(self.config.history_turns)..];
        let context: Vec<&Document> = selection.documents.iter().collect();
        let prompt = self.prompts.answer(query, &context, turns).map_err(|_| "prompt_error")?;

        let answer = self
            .llm
            .complete(
                &CompletionRequest::new(self.model.clone(), prompt)
                    .with_system(ANSWER_SYSTEM)
                    .with_sampling(ANSWER_TEMPERATURE, ANSWER_MAX_TOKENS),
            )
            .await
            .map_err(|error| {
                debug!(event_name = "retrieval.generate_failed", error = %error, "generation failed");
                "generation_failed"
            })?;

        match self.gate.evaluate(&answer) {
            GuardrailDecision::Allow => Ok(answer.trim().to_string()),
            GuardrailDecision::Deny { reason_code, .. } => Err(reason_code),
        }
    }

    /// Scores candidates in one batched call. A provider failure declines; an
    /// unusable score list falls back to similarity ordering.
    async fn rerank_and_select(
        &self,
        query: &str,
        candidates: Vec<RetrievalCandidate>,
    ) -> Result<Selection, &'static str> {
        let prompt = self.prompts.rerank(query, &candidates).map_err(|_| "prompt_error")?;
        let raw = self
            .llm
            .complete(
                &CompletionRequest::new(self.model.clone(), prompt)
                    .with_system(RERANK_SYSTEM)
                    .with_sampling(0.0, RERANK_MAX_TOKENS),
            )
            .await
            .map_err(|error| {
                debug!(event_name = "retrieval.rerank_failed", error = %error, "re-rank failed");
                "rerank_failed"
            })?;

        let scores = match decode_relevance_scores(&raw) {
            Ok(scores) => scores,
            Err(error) => {
                debug!(
                    event_name = "retrieval.rerank_fallback",
                    error = %error,
                    "re-rank output unusable; using similarity order"
                );
                return Ok(self.select_by_similarity(candidates));
            }
        };

        let by_id: HashMap<&str, u8> =
            scores.iter().map(|score| (score.id.0.as_str(), score.score)).collect();
        let scored: Vec<RetrievalCandidate> = candidates
            .into_iter()
            .map(|mut candidate| {
                candidate.relevance_score = by_id.get(candidate.document.id.0.as_str()).copied();
                candidate
            })
            .collect();

        if scored.iter().all(|candidate| candidate.relevance_score.is_none()) {
            return Ok(self.select_by_similarity(scored));
        }

        Ok(self.select_by_relevance(scored))
    }

    pub fn select_by_relevance(&self, candidates: Vec<RetrievalCandidate>) -> Selection {
        let mut qualifying: Vec<RetrievalCandidate> = candidates
            .into_iter()
            .filter(|candidate| {
                candidate.relevance_score.is_some_and(|score| score >= self.config.min_relevance)
            })
            .collect();
        qualifying.sort_by(|a, b| {
            b.relevance_score.cmp(&a.relevance_score).then_with(|| {
                b.similarity_score
                    .partial_cmp(&a.similarity_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        qualifying.truncate(self.config.max_context_documents);

        Selection {
            documents: qualifying.into_iter().map(|candidate| candidate.document).collect(),
            reranked: true,
        }
    }

    pub fn select_by_similarity(&self, mut candidates: Vec<RetrievalCandidate>) -> Selection {
        candidates.sort_by(|a, b| {
            b.similarity_score.partial_cmp(&a.similarity_score).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.config.fallback_candidates.min(self.config.max_context_documents));

        Selection {
            documents: candidates.into_iter().map(|candidate| candidate.document).collect(),
            reranked: false,
        }
    }
}

#[async_trait]
impl AnswerEngine for RetrievalEngine {
    async fn answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
        audit: &AuditContext,
    ) -> Option<String> {
        if query.trim().is_empty() {
            return None;
        }

        match self.run(query, history, audit).await {
            Ok(answer) => {
                info!(
                    event_name = "retrieval.answered",
                    correlation_id = %audit.correlation_id,
                    answer_chars = answer.chars().count(),
                    "grounded answer generated"
                );
                self.audit.emit(AuditEvent::new(
                    audit,
                    "retrieval.answered",
                    AuditCategory::Retrieval,
                    AuditOutcome::Success,
                ));
                Some(answer)
            }
            Err(reason_code) => {
                info!(
                    event_name = "retrieval.declined",
                    correlation_id = %audit.correlation_id,
                    reason_code,
                    "no automated answer"
                );
                self.audit.emit(
                    AuditEvent::new(
                        audit,
                        "retrieval.declined",
                        AuditCategory::Retrieval,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("reason_code", reason_code),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use deskpilot_core::audit::{AuditContext, InMemoryAuditSink};
    use deskpilot_core::conversation::{ConversationTurn, MessageDirection};
    use deskpilot_core::domain::knowledge::{Document, DocumentId};
    use deskpilot_db::repositories::InMemoryDocumentRepository;

    use super::{AnswerEngine, RetrievalEngine};
    use crate::fakes::{ScriptedLlmClient, StaticEmbeddingClient};
    use crate::llm::ProviderError;
    use crate::prompts::PromptBuilder;

    fn corpus(count: usize) -> Vec<Document> {
        (1..=count)
            .map(|n| Document {
                id: DocumentId(format!("kb-{n:02}")),
                title: format!("Artigo {n:02}"),
                category: Some("faq".into()),
                content: format!("Procedimento de suporte número {n:02}."),
                embedding: vec![1.0, 0.0],
            })
            .collect()
    }

    fn scores_json(scores: &[u8]) -> String {
        let entries: Vec<String> = scores
            .iter()
            .enumerate()
            .map(|(index, score)| format!(r#"{{"id":"kb-{:02}","score":{score}}}"#, index + 1))
            .collect();
        format!("[{}]", entries.join(","))
    }

    fn build_engine(
        llm: Arc<ScriptedLlmClient>,
        embeddings: Arc<StaticEmbeddingClient>,
        documents: Vec<Document>,
        audit: Arc<InMemoryAuditSink>,
    ) -> RetrievalEngine {
        RetrievalEngine::new(
            embeddings,
            llm,
            Arc::new(InMemoryDocumentRepository::with_documents(documents)),
            PromptBuilder::new().expect("templates"),
            "llama3.1",
            audit,
        )
    }

    fn ctx() -> AuditContext {
        AuditContext::system("corr-rag", "test")
    }

    #[tokio::test]
    async fn only_top_scored_documents_reach_generation() {
        let mut scores = vec![95, 72];
        scores.extend([40_u8; 10]);
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Ok(scores_json(&scores)),
            Ok("Siga o Artigo 01 para resolver.".to_string()),
        ]));
        let audit = Arc::new(InMemoryAuditSink::default());
        let engine = build_engine(
            llm.clone(),
            Arc::new(StaticEmbeddingClient::new(vec![1.0, 0.0])),
            corpus(12),
            audit.clone(),
        );

        let answer = engine.answer("como resolver?", &[], &ctx()).await;
        assert_eq!(answer.as_deref(), Some("Siga o Artigo 01 para resolver."));

        let requests = llm.requests().await;
        assert_eq!(requests.len(), 2);
        assert!(requests[0].prompt.contains("[kb-12] Artigo 12"));
        let generation = &requests[1].prompt;
        assert!(generation.contains("### Artigo 01"));
        assert!(generation.contains("### Artigo 02"));
        for n in 3..=12 {
            assert!(!generation.contains(&format!("### Artigo {n:02}")));
        }
        assert_eq!(audit.event_types(), vec!["retrieval.answered".to_string()]);
    }

    #[tokio::test]
    async fn all_scores_below_threshold_decline_without_generation() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Ok(scores_json(&[65; 6]))]));
        let audit = Arc::new(InMemoryAuditSink::default());
        let engine = build_engine(
            llm.clone(),
            Arc::new(StaticEmbeddingClient::new(vec![1.0, 0.0])),
            corpus(6),
            audit.clone(),
        );

        assert_eq!(engine.answer("como resolver?", &[], &ctx()).await, None);
        assert_eq!(llm.calls().await, 1);
        let declined = audit.events().pop().expect("declined event");
        assert_eq!(
            declined.metadata.get("reason_code").map(String::as_str),
            Some("below_relevance_threshold")
        );
    }

    #[tokio::test]
    async fn malformed_rerank_falls_back_to_similarity_capped_at_three() {
        let mut documents = corpus(6);
        for (index, document) in documents.iter_mut().enumerate() {
            document.embedding = vec![1.0, index as f32 * 0.3];
        }
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Ok("não consegui avaliar".to_string()),
            Ok("Resposta com base nos artigos.".to_string()),
        ]));
        let engine = build_engine(
            llm.clone(),
            Arc::new(StaticEmbeddingClient::new(vec![1.0, 0.0])),
            documents,
            Arc::new(InMemoryAuditSink::default()),
        );

        let answer = engine.answer("procedimento", &[], &ctx()).await;
        assert_eq!(answer.as_deref(), Some("Resposta com base nos artigos."));

        let generation = &llm.requests().await[1].prompt;
        assert!(generation.contains("### Artigo 01"));
        assert!(generation.contains("### Artigo 02"));
        assert!(generation.contains("### Artigo 03"));
        assert!(!generation.contains("### Artigo 04"));
    }

    #[tokio::test]
    async fn insufficient_information_answer_is_withheld() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Ok(scores_json(&[90])),
            Ok("Não tenho informações suficientes.".to_string()),
        ]));
        let engine = build_engine(
            llm,
            Arc::new(StaticEmbeddingClient::new(vec![1.0, 0.0])),
            corpus(1),
            Arc::new(InMemoryAuditSink::default()),
        );

        assert_eq!(engine.answer("qual o horário?", &[], &ctx()).await, None);
    }

    #[tokio::test]
    async fn provider_failures_decline_quietly() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let engine = build_engine(
            llm.clone(),
            Arc::new(StaticEmbeddingClient::failing(ProviderError::Timeout { after_ms: 30_000 })),
            corpus(3),
            Arc::new(InMemoryAuditSink::default()),
        );
        assert_eq!(engine.answer("vpn", &[], &ctx()).await, None);
        assert_eq!(llm.calls().await, 0);

        let llm = Arc::new(ScriptedLlmClient::new(vec![Err(ProviderError::Http {
            status: 500,
            body: String::new(),
        })]));
        let engine = build_engine(
            llm,
            Arc::new(StaticEmbeddingClient::new(vec![1.0, 0.0])),
            corpus(3),
            Arc::new(InMemoryAuditSink::default()),
        );
        assert_eq!(engine.answer("vpn", &[], &ctx()).await, None);
    }

    #[tokio::test]
    async fn empty_knowledge_base_declines_before_any_model_call() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let engine = build_engine(
            llm.clone(),
            Arc::new(StaticEmbeddingClient::new(vec![1.0, 0.0])),
            Vec::new(),
            Arc::new(InMemoryAuditSink::default()),
        );

        assert_eq!(engine.answer("vpn", &[], &ctx()).await, None);
        assert_eq!(llm.calls().await, 0);
    }

    #[tokio::test]
    async fn only_recent_history_turns_are_used() {
        let history: Vec<ConversationTurn> = (0..8)
            .map(|n| ConversationTurn {
                direction: MessageDirection::Inbound,
                text: format!("mensagem {n}"),
                at: Utc::now(),
            })
            .collect();
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Ok(scores_json(&[88])),
            Ok("Use o Artigo 01.".to_string()),
        ]));
        let engine = build_engine(
            llm.clone(),
            Arc::new(StaticEmbeddingClient::new(vec![1.0, 0.0])),
            corpus(1),
            Arc::new(InMemoryAuditSink::default()),
        );

        engine.answer("e agora?", &history, &ctx()).await.expect("answer");

        let generation = &llm.requests().await[1].prompt;
        assert!(!generation.contains("mensagem 2"));
        assert!(generation.contains("mensagem 3"));
        assert!(generation.contains("mensagem 7"));
    }
}
