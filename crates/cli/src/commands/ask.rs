use std::sync::Arc;

use serde_json::json;

use deskpilot_agent::{
    AnswerEngine, OpenAiCompatibleClient, PromptBuilder, Resilient, RetrievalEngine, RetryPolicy,
};
use deskpilot_core::audit::{AuditContext, TracingAuditSink};
use deskpilot_db::repositories::SqlDocumentRepository;

use crate::commands::{open_database, prepare, CommandResult};

/// Runs one question through retrieval without any conversation history.
pub fn run(question: &str) -> CommandResult {
    let question = question.trim();
    if question.is_empty() {
        return CommandResult::failure("ask", "invalid_input", "question is empty", 2);
    }

    let (config, runtime) = match prepare("ask") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_database("ask", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };

        let client = match OpenAiCompatibleClient::from_config(&config) {
            Ok(client) => Arc::new(Resilient::new(client, RetryPolicy::from_config(&config.llm))),
            Err(error) => {
                return CommandResult::failure("ask", "provider_setup", error.to_string(), 6)
            }
        };
        let prompts = match PromptBuilder::new() {
            Ok(prompts) => prompts,
            Err(error) => return CommandResult::failure("ask", "prompt_setup", error.to_string(), 6),
        };
        let engine = RetrievalEngine::new(
            client.clone(),
            client,
            Arc::new(SqlDocumentRepository::new(pool.clone())),
            prompts,
            config.llm.model.clone(),
            Arc::new(TracingAuditSink),
        )
        .with_config(config.retrieval.clone());

        let answer =
            engine.answer(question, &[], &AuditContext::system("cli-ask", "cli")).await;
        pool.close().await;

        match answer {
            Some(answer) => CommandResult::success_with_data(
                "ask",
                answer.clone(),
                Some(json!({ "answered": true, "answer": answer })),
            ),
            None => CommandResult::success_with_data(
                "ask",
                "no grounded answer; the contact would receive no reply",
                Some(json!({ "answered": false })),
            ),
        }
    })
}
