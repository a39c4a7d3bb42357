use std::sync::Arc;

use deskpilot_agent::{KnowledgeIndexer, OpenAiCompatibleClient, Resilient, RetryPolicy};
use deskpilot_db::repositories::SqlDocumentRepository;

use crate::commands::{open_database, prepare, CommandResult};

pub fn run(all: bool) -> CommandResult {
    let (config, runtime) = match prepare("reindex") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_database("reindex", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };

        let client = match OpenAiCompatibleClient::from_config(&config) {
            Ok(client) => client,
            Err(error) => {
                return CommandResult::failure("reindex", "provider_setup", error.to_string(), 6)
            }
        };
        let indexer = KnowledgeIndexer::new(
            Arc::new(Resilient::new(client, RetryPolicy::from_config(&config.llm))),
            Arc::new(SqlDocumentRepository::new(pool.clone())),
        );

        let outcome = indexer.reindex(!all).await;
        pool.close().await;

        match outcome {
            Ok(report) => {
                let message = format!(
                    "embedded {} of {} documents ({} failed)",
                    report.embedded, report.considered, report.failed
                );
                let data = serde_json::to_value(&report).ok();
                if report.failed > 0 {
                    // Partial success still exits non-zero so schedulers notice.
                    let mut result = CommandResult::success_with_data("reindex", message, data);
                    result.exit_code = 8;
                    result
                } else {
                    CommandResult::success_with_data("reindex", message, data)
                }
            }
            Err(error) => CommandResult::failure("reindex", "persistence", error.to_string(), 7),
        }
    })
}
