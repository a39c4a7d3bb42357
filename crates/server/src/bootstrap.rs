use std::sync::Arc;

use deskpilot_agent::{
    ClassificationEngine, OpenAiCompatibleClient, PromptBuilder, PromptError, ProviderError,
    Resilient, RetrievalEngine, RetryPolicy,
};
use deskpilot_core::audit::{AuditSink, TracingAuditSink};
use deskpilot_core::config::{AppConfig, ConfigError};
use deskpilot_db::repositories::{
    SqlConversationStateRepository, SqlDocumentRepository, SqlMessageLogRepository,
    SqlTicketRepository,
};
use deskpilot_db::{connect_with_settings, migrations, DbPool, SqlSettingsProvider};
use deskpilot_gateway::{
    sender_from_config, ConversationStores, InboundRouter, RouterSettings, SendError,
};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("prompt templates failed to load: {0}")]
    Prompts(#[from] PromptError),
    #[error("gateway sender setup failed: {0}")]
    Gateway(#[from] SendError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let api = build_services(&config, db_pool.clone())?;
    info!(
        event_name = "system.bootstrap.services_ready",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        llm_model = %config.llm.model,
        gateway_mode = if config.gateway.base_url.is_some() { "http" } else { "disabled" },
        "decision engine services initialized"
    );

    Ok(Application { config, db_pool, api })
}

fn build_services(config: &AppConfig, db_pool: DbPool) -> Result<ApiState, BootstrapError> {
    let provider = Arc::new(Resilient::new(
        OpenAiCompatibleClient::from_config(config)?,
        RetryPolicy::from_config(&config.llm),
    ));
    let prompts = PromptBuilder::new()?;
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    let classifier = ClassificationEngine::new(provider.clone(), prompts.clone(), audit.clone());
    let retrieval = RetrievalEngine::new(
        provider.clone(),
        provider,
        Arc::new(SqlDocumentRepository::new(db_pool.clone())),
        prompts,
        config.llm.model.clone(),
        audit.clone(),
    )
    .with_config(config.retrieval.clone());

    let tickets = Arc::new(SqlTicketRepository::new(db_pool.clone()));
    let router = InboundRouter::new(
        ConversationStores {
            states: Arc::new(SqlConversationStateRepository::new(db_pool.clone())),
            messages: Arc::new(SqlMessageLogRepository::new(db_pool.clone())),
            tickets: tickets.clone(),
        },
        Arc::new(retrieval),
        Arc::from(sender_from_config(&config.gateway)?),
        audit,
        RouterSettings::from_config(config),
    );

    Ok(ApiState {
        classifier: Arc::new(classifier),
        settings: Arc::new(SqlSettingsProvider::new(db_pool)),
        tickets,
        router: Arc::new(router),
        webhook_secret: config.gateway.webhook_secret.clone(),
        instance_id: config.gateway.instance_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use deskpilot_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use deskpilot_db::SettingsProvider;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    #[test]
    fn config_rejects_gateway_without_api_key() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                gateway_base_url: Some("https://gateway.example.test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = BootstrapError::from(result.err().expect("error")).to_string();
        assert!(message.contains("gateway.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_services() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;

        let app = bootstrap_with_config(config).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('tickets', 'conversation_state', 'knowledge_documents')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables should exist after bootstrap");
        assert_eq!(table_count, 3);

        let snapshot = app.api.settings.snapshot().await;
        assert!(snapshot.teams.is_empty());
        assert_eq!(app.api.instance_id, "default");
        assert!(app.api.webhook_secret.is_none());

        app.db_pool.close().await;
    }
}
