//! Prompt rendering.
//!
//! Templates are compiled once into a private [`Tera`] instance; every render
//! is a pure function of its inputs and the per-request settings snapshot.

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use deskpilot_core::conversation::{ConversationTurn, MessageDirection};
use deskpilot_core::domain::knowledge::{Document, RetrievalCandidate};
use deskpilot_core::domain::settings::SettingsSnapshot;
use deskpilot_core::domain::ticket::{ClassificationMode, ClassificationRequest};

pub const CLASSIFICATION_SYSTEM: &str = "Você é um analista de service desk. Responda somente com um objeto JSON válido, sem texto adicional.";
pub const RERANK_SYSTEM: &str = "Você avalia a relevância de documentos para uma pergunta. Responda somente com JSON.";
pub const ANSWER_SYSTEM: &str = "Você é o assistente de atendimento. Responda em português, de forma curta, usando apenas o contexto fornecido.";

const RERANK_EXCERPT_CHARS: usize = 600;
const ANSWER_DOCUMENT_CHARS: usize = 2_000;

const CLASSIFICATION_TEMPLATE: &str = r#"Classifique o chamado abaixo.

Mensagem do usuário:
"""
{{ message }}
"""

Matriz de prioridade (nível: urgência x impacto, SLA):
{% for row in matrix %}- {{ row.level }}: urgência {{ row.urgency }} x impacto {{ row.impact }}, SLA {{ row.sla_minutes }} min
{% endfor %}
{% if emergency_keywords %}Palavras-chave de emergência: {{ emergency_keywords | join(sep=", ") }}
{% endif %}{% if matched_keywords %}
ESCALONAMENTO OBRIGATÓRIO: a mensagem contém as palavras-chave de emergência {{ matched_keywords | join(sep=", ") }}. A prioridade deve ser "immediate" ou "crisis".
{% endif %}{% if ask_team %}
Equipes disponíveis (use o id, nunca o nome):
{% for team in teams %}- id: {{ team.id }} | {{ team.name }}{% if team.specialty %} | {{ team.specialty }}{% endif %}{% if team.hint %} | capacidade: {{ team.hint }}{% endif %}
{% endfor %}{% endif %}{% if known_priority %}
Prioridade já definida: {{ known_priority }}.
{% endif %}{% if known_team %}
Equipe já definida: {{ known_team }}.
{% endif %}
Responda com JSON contendo:
{% if ask_title %}- "title": até 3 palavras descrevendo o problema
{% endif %}{% if ask_priority %}- "priority": um de "low", "medium", "high", "immediate", "crisis"
{% endif %}{% if ask_team %}- "team_id": o id de uma das equipes acima
{% endif %}- "rationale": uma frase curta
- "confidence": "high", "medium" ou "low"
"#;

const RERANK_TEMPLATE: &str = r#"Pergunta: {{ query }}

Avalie de 0 a 100 o quanto cada documento ajuda a responder a pergunta.
{% for doc in documents %}
[{{ doc.id }}] {{ doc.title }}
{{ doc.excerpt }}
{% endfor %}
Responda com uma lista JSON no formato [{"id": "<id>", "score": <0-100>}] contendo todos os documentos.
"#;

const ANSWER_TEMPLATE: &str = r#"Contexto:
{% for doc in documents %}
### {{ doc.title }}
{{ doc.content }}
{% endfor %}
{% if history %}
Conversa recente:
{% for turn in history %}{{ turn.speaker }}: {{ turn.text }}
{% endfor %}{% endif %}
Pergunta do cliente: {{ query }}

Responda apenas com base no contexto. Se o contexto não for suficiente, responda exatamente: "Não tenho informações suficientes."
"#;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template error: {0}")]
    Template(String),
}

impl From<tera::Error> for PromptError {
    fn from(error: tera::Error) -> Self {
        let mut message = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Template(message)
    }
}

#[derive(Serialize)]
struct MatrixRow<'a> {
    level: &'static str,
    urgency: &'a str,
    impact: &'a str,
    sla_minutes: u32,
}

#[derive(Serialize)]
struct TeamRow<'a> {
    id: &'a str,
    name: &'a str,
    specialty: &'a str,
    hint: Option<&'static str>,
}

#[derive(Serialize)]
struct ExcerptRow<'a> {
    id: &'a str,
    title: &'a str,
    excerpt: String,
}

#[derive(Serialize)]
struct ContextRow<'a> {
    title: &'a str,
    content: String,
}

#[derive(Serialize)]
struct HistoryRow<'a> {
    speaker: &'static str,
    text: &'a str,
}

#[derive(Clone, Debug)]
pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("classification.txt", CLASSIFICATION_TEMPLATE),
            ("rerank.txt", RERANK_TEMPLATE),
            ("answer.txt", ANSWER_TEMPLATE),
        ])?;
        Ok(Self { tera })
    }

    pub fn classification(
        &self,
        request: &ClassificationRequest,
        snapshot: &SettingsSnapshot,
    ) -> Result<String, PromptError> {
        let mode = request.mode();
        let settings = &snapshot.settings;

        let matrix: Vec<MatrixRow<'_>> = settings
            .priority_matrix
            .iter()
            .map(|(level, entry)| MatrixRow {
                level: level.as_str(),
                urgency: &entry.urgency_label,
                impact: &entry.impact_label,
                sla_minutes: entry.sla_minutes,
            })
            .collect();

        let teams: Vec<TeamRow<'_>> = snapshot
            .teams
            .iter()
            .map(|team| TeamRow {
                id: &team.id.0,
                name: &team.name,
                specialty: &team.specialty_description,
                hint: settings.capacity_hint(team).map(|hint| hint.as_str()),
            })
            .collect();

        let known_team = request.known_team_id.as_ref().map(|id| {
            snapshot.find_team(id).map(|team| team.name.clone()).unwrap_or_else(|| id.0.clone())
        });

        let mut context = Context::new();
        context.insert("message", request.message_text.trim());
        context.insert("matrix", &matrix);
        context.insert("emergency_keywords", &settings.emergency_keywords);
        context.insert(
            "matched_keywords",
            &settings.matched_emergency_keywords(&request.message_text),
        );
        context.insert("teams", &teams);
        context.insert("ask_title", &(mode == ClassificationMode::Full));
        context.insert(
            "ask_priority",
            &matches!(mode, ClassificationMode::Full | ClassificationMode::PriorityOnly),
        );
        context.insert(
            "ask_team",
            &matches!(mode, ClassificationMode::Full | ClassificationMode::TeamOnly),
        );
        context.insert("known_priority", &request.known_priority.map(|level| level.as_str()));
        context.insert("known_team", &known_team);

        Ok(self.tera.render("classification.txt", &context)?)
    }

    pub fn rerank(&self, query: &str, candidates: &[RetrievalCandidate]) -> Result<String, PromptError> {
        let documents: Vec<ExcerptRow<'_>> = candidates
            .iter()
            .map(|candidate| ExcerptRow {
                id: &candidate.document.id.0,
                title: &candidate.document.title,
                excerpt: candidate.document.excerpt(RERANK_EXCERPT_CHARS),
            })
            .collect();

        let mut context = Context::new();
        context.insert("query", query.trim());
        context.insert("documents", &documents);
        Ok(self.tera.render("rerank.txt", &context)?)
    }

    pub fn answer(
        &self,
        query: &str,
        documents: &[&Document],
        history: &[ConversationTurn],
    ) -> Result<String, PromptError> {
        let documents: Vec<ContextRow<'_>> = documents
            .iter()
            .map(|document| ContextRow {
                title: &document.title,
                content: document.excerpt(ANSWER_DOCUMENT_CHARS),
            })
            .collect();
        let history: Vec<HistoryRow<'_>> = history
            .iter()
            .map(|turn| HistoryRow {
                speaker: match turn.direction {
                    MessageDirection::Inbound => "Cliente",
                    MessageDirection::Outbound => "Atendente",
                },
                text: &turn.text,
            })
            .collect();

        let mut context = Context::new();
        context.insert("query", query.trim());
        context.insert("documents", &documents);
        context.insert("history", &history);
        Ok(self.tera.render("answer.txt", &context)?)
    }
}
