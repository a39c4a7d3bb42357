//! Ticket classification.
//!
//! One model call decides whichever of {title, priority, team} the caller did
//! not already supply. The call never fails: provider and decode failures
//! degrade to the triage team, the default priority and a lexicon title.

use std::sync::Arc;

use tracing::{info, warn};

use deskpilot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use deskpilot_core::domain::priority::DEFAULT_PRIORITY;
use deskpilot_core::domain::settings::SettingsSnapshot;
use deskpilot_core::domain::team::TeamId;
use deskpilot_core::domain::ticket::{
    ClassificationMode, ClassificationRequest, ClassificationResult, Confidence,
};

use crate::decode::{decode_classification, ModelClassification};
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::{PromptBuilder, CLASSIFICATION_SYSTEM};
use crate::text::tokens;

/// Model calls per classification when the output cannot be decoded.
const DECODE_ATTEMPTS: usize = 2;
const MAX_TITLE_WORDS: usize = 3;
pub const GENERIC_TITLE: &str = "Chamado Geral";

/// Ordered keyword lexicon used when no usable title is available.
const TITLE_LEXICON: &[(&str, &[&str])] = &[
    ("Problema de Áudio", &["audio", "som", "microfone", "fone", "headset"]),
    ("Problema de Mídia", &["video", "imagem", "foto", "camera", "midia", "projetor", "tela"]),
    (
        "Problema no Sistema",
        &["sistema", "erro", "travou", "caiu", "login", "senha", "acesso", "servidor"],
    ),
    ("Questão Jurídica", &["contrato", "juridico", "lgpd", "processo", "advogado", "legal"]),
    (
        "Nova Solicitação",
        &["solicito", "solicitacao", "preciso", "pedido", "relatorio", "gostaria", "request"],
    ),
];

pub struct ClassificationEngine {
    llm: Arc<dyn LlmClient>,
    prompts: PromptBuilder,
    audit: Arc<dyn AuditSink>,
}

impl ClassificationEngine {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptBuilder, audit: Arc<dyn AuditSink>) -> Self {
        Self { llm, prompts, audit }
    }

    pub async fn classify(
        &self,
        request: &ClassificationRequest,
        snapshot: &SettingsSnapshot,
    ) -> ClassificationResult {
        let audit = AuditContext::system("classification", "classifier");
        self.classify_with_context(request, snapshot, &audit).await
    }

    pub async fn classify_with_context(
        &self,
        request: &ClassificationRequest,
        snapshot: &SettingsSnapshot,
        audit: &AuditContext,
    ) -> ClassificationResult {
        let mode = request.mode();
        if mode == ClassificationMode::Skip {
            return self.skip(request, audit);
        }

        let prompt = match self.prompts.classification(request, snapshot) {
            Ok(prompt) => prompt,
            Err(error) => {
                return self.degrade(request, snapshot, mode, "prompt_error", &error.to_string(), audit)
            }
        };

        let model = &snapshot.settings.model_settings;
        let completion = CompletionRequest::new(model.model_name.clone(), prompt)
            .with_system(CLASSIFICATION_SYSTEM)
            .with_sampling(model.temperature, model.max_tokens)
            .json();

        for attempt in 1..=DECODE_ATTEMPTS {
            let raw = match self.llm.complete(&completion).await {
                Ok(raw) => raw,
                Err(error) => {
                    return self.degrade(
                        request,
                        snapshot,
                        mode,
                        "provider_error",
                        &error.to_string(),
                        audit,
                    )
                }
            };

            match decode_classification(&raw, mode) {
                Ok(decoded) => return self.resolve(request, snapshot, mode, decoded, audit),
                Err(error) if attempt < DECODE_ATTEMPTS => {
                    warn!(
                        event_name = "classification.decode_retry",
                        correlation_id = %audit.correlation_id,
                        mode = mode.as_str(),
                        error = %error,
                        "model output could not be decoded; retrying once"
                    );
                }
                Err(error) => {
                    return self.degrade(
                        request,
                        snapshot,
                        mode,
                        "decode_error",
                        &error.to_string(),
                        audit,
                    )
                }
            }
        }

        self.degrade(request, snapshot, mode, "decode_error", "no attempts made", audit)
    }

    fn skip(&self, request: &ClassificationRequest, audit: &AuditContext) -> ClassificationResult {
        let result = ClassificationResult {
            title: request
                .known_title
                .as_deref()
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback_title(&request.message_text)),
            priority: request.known_priority.unwrap_or(DEFAULT_PRIORITY),
            team_id: request.known_team_id.clone(),
            rationale: "priority and team supplied by caller".to_string(),
            confidence: Confidence::High,
            mode: ClassificationMode::Skip,
            degraded: false,
        };
        self.emit(audit, "classification.skipped", AuditOutcome::Success, &result, None);
        result
    }

    fn resolve(
        &self,
        request: &ClassificationRequest,
        snapshot: &SettingsSnapshot,
        mode: ClassificationMode,
        decoded: ModelClassification,
        audit: &AuditContext,
    ) -> ClassificationResult {
        let priority = match (request.known_priority, decoded.priority) {
            (Some(known), _) => known,
            (None, Some(normalized)) => {
                if !normalized.recognized {
                    self.audit.emit(
                        AuditEvent::new(
                            audit,
                            "classification.unknown_priority_label",
                            AuditCategory::Classification,
                            AuditOutcome::Degraded,
                        )
                        .with_metadata("label", decoded.raw_priority.clone().unwrap_or_default())
                        .with_metadata("normalized", normalized.level.as_str()),
                    );
                }
                normalized.level
            }
            (None, None) => DEFAULT_PRIORITY,
        };

        let team_id = match &request.known_team_id {
            Some(known) => Some(known.clone()),
            None => self.resolve_team(snapshot, &decoded, audit),
        };

        let title = request
            .known_title
            .as_deref()
            .and_then(clean_title)
            .or_else(|| decoded.title.as_deref().and_then(clean_title))
            .unwrap_or_else(|| fallback_title(&request.message_text));

        let result = ClassificationResult {
            title,
            priority,
            team_id,
            rationale: decoded.rationale,
            confidence: decoded.confidence,
            mode,
            degraded: false,
        };
        self.emit(audit, "classification.completed", AuditOutcome::Success, &result, None);
        info!(
            event_name = "classification.completed",
            correlation_id = %audit.correlation_id,
            mode = mode.as_str(),
            priority = result.priority.as_str(),
            team_id = result.team_id.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
            confidence = result.confidence.as_str(),
            "ticket classified"
        );
        result
    }

    /// Model's team when it names an active team with usable confidence,
    /// otherwise the triage team.
    fn resolve_team(
        &self,
        snapshot: &SettingsSnapshot,
        decoded: &ModelClassification,
        audit: &AuditContext,
    ) -> Option<TeamId> {
        let fallback_reason = match &decoded.team_id {
            None => "missing_team",
            Some(_) if decoded.confidence == Confidence::Low => "low_confidence",
            Some(id) => match snapshot.find_team(id) {
                Some(team) => return Some(team.id.clone()),
                None => "unknown_team",
            },
        };

        let triage = snapshot.triage_team().map(|team| team.id.clone());
        self.audit.emit(
            AuditEvent::new(
                audit,
                "classification.triage_fallback",
                AuditCategory::Classification,
                AuditOutcome::Degraded,
            )
            .with_metadata("reason", fallback_reason)
            .with_metadata(
                "model_team_id",
                decoded.team_id.as_ref().map(|id| id.0.clone()).unwrap_or_default(),
            )
            .with_metadata(
                "triage_team_id",
                triage.as_ref().map(|id| id.0.clone()).unwrap_or_default(),
            ),
        );
        triage
    }

    fn degrade(
        &self,
        request: &ClassificationRequest,
        snapshot: &SettingsSnapshot,
        mode: ClassificationMode,
        reason_code: &'static str,
        detail: &str,
        audit: &AuditContext,
    ) -> ClassificationResult {
        warn!(
            event_name = "classification.degraded",
            correlation_id = %audit.correlation_id,
            mode = mode.as_str(),
            reason_code,
            detail,
            "classification degraded to fallback values"
        );

        let result = ClassificationResult {
            title: request
                .known_title
                .as_deref()
                .and_then(clean_title)
                .unwrap_or_else(|| fallback_title(&request.message_text)),
            priority: request.known_priority.unwrap_or(DEFAULT_PRIORITY),
            team_id: request
                .known_team_id
                .clone()
                .or_else(|| snapshot.triage_team().map(|team| team.id.clone())),
            rationale: format!("classification unavailable ({reason_code})"),
            confidence: Confidence::Low,
            mode,
            degraded: true,
        };
        self.emit(audit, "classification.degraded", AuditOutcome::Degraded, &result, Some(reason_code));
        result
    }

    fn emit(
        &self,
        audit: &AuditContext,
        event_type: &str,
        outcome: AuditOutcome,
        result: &ClassificationResult,
        reason_code: Option<&str>,
    ) {
        let mut event = AuditEvent::new(audit, event_type, AuditCategory::Classification, outcome)
            .with_metadata("mode", result.mode.as_str())
            .with_metadata("priority", result.priority.as_str())
            .with_metadata("confidence", result.confidence.as_str())
            .with_metadata(
                "team_id",
                result.team_id.as_ref().map(|id| id.0.clone()).unwrap_or_default(),
            );
        if let Some(reason_code) = reason_code {
            event = event.with_metadata("reason_code", reason_code);
        }
        self.audit.emit(event);
    }
}

/// Strips punctuation and keeps at most the first three words.
pub fn clean_title(raw: &str) -> Option<String> {
    let stripped: String =
        raw.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace()).collect();
    let title = stripped.split_whitespace().take(MAX_TITLE_WORDS).collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Title from the keyword lexicon, or the generic placeholder.
pub fn fallback_title(message: &str) -> String {
    let words = tokens(message);
    TITLE_LEXICON
        .iter()
        .find(|(_, keywords)| {
            keywords.iter().any(|keyword| words.iter().any(|word| word == keyword))
        })
        .map(|(title, _)| (*title).to_string())
        .unwrap_or_else(|| GENERIC_TITLE.to_string())
}
