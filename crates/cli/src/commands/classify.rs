use std::sync::Arc;

use deskpilot_agent::{
    ClassificationEngine, OpenAiCompatibleClient, PromptBuilder, Resilient, RetryPolicy,
};
use deskpilot_core::audit::{AuditContext, TracingAuditSink};
use deskpilot_core::domain::priority::normalize_priority_label;
use deskpilot_core::domain::ticket::{ClassificationRequest, TicketId};
use deskpilot_db::repositories::{SqlTicketRepository, TicketRepository};
use deskpilot_db::{SettingsProvider, SqlSettingsProvider};

use crate::commands::{open_database, prepare, CommandResult};

#[derive(Clone, Debug, Default)]
pub struct ClassifyArgs {
    pub text: String,
    pub priority: Option<String>,
    pub team: Option<String>,
    pub title: Option<String>,
    /// Writes the result back to this ticket when set.
    pub ticket: Option<String>,
}

pub fn run(args: ClassifyArgs) -> CommandResult {
    if args.text.trim().is_empty() {
        return CommandResult::failure("classify", "invalid_input", "message text is empty", 2);
    }

    let mut request = ClassificationRequest::new(args.text.trim());
    if let Some(label) = args.priority.as_deref() {
        let normalized = normalize_priority_label(label);
        if !normalized.recognized {
            return CommandResult::failure(
                "classify",
                "invalid_input",
                format!("unknown priority `{label}` (expected low, medium, high, urgent, immediate or crisis)"),
                2,
            );
        }
        request = request.with_priority(normalized.level);
    }
    if let Some(team) = args.team.as_deref().map(str::trim).filter(|team| !team.is_empty()) {
        request = request.with_team(team);
    }
    if let Some(title) = args.title.as_deref().map(str::trim).filter(|title| !title.is_empty()) {
        request = request.with_title(title);
    }

    let (config, runtime) = match prepare("classify") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_database("classify", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };

        let client = match OpenAiCompatibleClient::from_config(&config) {
            Ok(client) => client,
            Err(error) => {
                return CommandResult::failure("classify", "provider_setup", error.to_string(), 6)
            }
        };
        let prompts = match PromptBuilder::new() {
            Ok(prompts) => prompts,
            Err(error) => {
                return CommandResult::failure("classify", "prompt_setup", error.to_string(), 6)
            }
        };
        let engine = ClassificationEngine::new(
            Arc::new(Resilient::new(client, RetryPolicy::from_config(&config.llm))),
            prompts,
            Arc::new(TracingAuditSink),
        );

        let snapshot = SqlSettingsProvider::new(pool.clone()).snapshot().await;
        let ticket_id = args.ticket.map(TicketId);
        let audit = AuditContext::new(ticket_id.clone(), None, "cli-classify", "cli");
        let result = engine.classify_with_context(&request, &snapshot, &audit).await;

        if let Some(id) = &ticket_id {
            if let Err(error) =
                SqlTicketRepository::new(pool.clone()).apply_classification(id, &result).await
            {
                pool.close().await;
                return CommandResult::failure("classify", "persistence", error.to_string(), 7);
            }
        }
        pool.close().await;

        let message = format!(
            "{} | {} | {}{}",
            result.title,
            result.priority,
            result.team_id.as_ref().map(|team| team.0.as_str()).unwrap_or("<no team>"),
            if result.degraded { " (degraded)" } else { "" }
        );
        CommandResult::success_with_data("classify", message, serde_json::to_value(&result).ok())
    })
}
