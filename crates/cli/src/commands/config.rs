use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use toml::Value;

use deskpilot_core::config::{AppConfig, LoadOptions};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct EffectiveEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with per-key source attribution. Precedence is
/// env over file over default; secrets never leave this function unredacted.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let file_path = detect_config_path();
    let file_doc = file_path.as_deref().and_then(load_config_file_doc);
    let resolve = |key: &'static str, env_key: &'static str, value: String| EffectiveEntry {
        key,
        value,
        source: field_source(key, env_key, file_doc.as_ref(), file_path.as_deref()),
    };

    let entries = vec![
        resolve("database.url", "DESKPILOT_DATABASE_URL", config.database.url.clone()),
        resolve(
            "database.max_connections",
            "DESKPILOT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        resolve(
            "gateway.base_url",
            "DESKPILOT_GATEWAY_BASE_URL",
            config.gateway.base_url.clone().unwrap_or_else(|| "<unset: sends disabled>".into()),
        ),
        resolve("gateway.api_key", "DESKPILOT_GATEWAY_API_KEY", redact(&config.gateway.api_key)),
        resolve(
            "gateway.instance_id",
            "DESKPILOT_GATEWAY_INSTANCE_ID",
            config.gateway.instance_id.clone(),
        ),
        resolve(
            "gateway.webhook_secret",
            "DESKPILOT_GATEWAY_WEBHOOK_SECRET",
            redact(&config.gateway.webhook_secret),
        ),
        resolve("llm.provider", "DESKPILOT_LLM_PROVIDER", config.llm.provider.as_str().into()),
        resolve("llm.model", "DESKPILOT_LLM_MODEL", config.llm.model.clone()),
        resolve(
            "llm.embedding_model",
            "DESKPILOT_LLM_EMBEDDING_MODEL",
            config.llm.embedding_model.clone(),
        ),
        resolve(
            "llm.base_url",
            "DESKPILOT_LLM_BASE_URL",
            config
                .llm
                .base_url
                .clone()
                .unwrap_or_else(|| config.llm.provider.default_base_url().to_string()),
        ),
        resolve("llm.api_key", "DESKPILOT_LLM_API_KEY", redact(&config.llm.api_key)),
        resolve(
            "llm.max_retries",
            "DESKPILOT_LLM_MAX_RETRIES",
            config.llm.max_retries.to_string(),
        ),
        resolve(
            "retrieval.match_count",
            "DESKPILOT_RETRIEVAL_MATCH_COUNT",
            config.retrieval.match_count.to_string(),
        ),
        resolve("retrieval.alpha", "DESKPILOT_RETRIEVAL_ALPHA", config.retrieval.alpha.to_string()),
        resolve(
            "retrieval.min_relevance",
            "DESKPILOT_RETRIEVAL_MIN_RELEVANCE",
            config.retrieval.min_relevance.to_string(),
        ),
        resolve(
            "conversation.reply_ttl_secs",
            "DESKPILOT_CONVERSATION_REPLY_TTL_SECS",
            config.conversation.reply_ttl_secs.to_string(),
        ),
        resolve(
            "server.bind_address",
            "DESKPILOT_SERVER_BIND_ADDRESS",
            format!("{}:{}", config.server.bind_address, config.server.port),
        ),
        resolve("logging.level", "DESKPILOT_LOGGING_LEVEL", config.logging.level.clone()),
        resolve(
            "logging.format",
            "DESKPILOT_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ];

    let message = std::iter::once(
        "effective config (source precedence: env > file > default):".to_string(),
    )
    .chain(
        entries
            .iter()
            .map(|entry| format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)),
    )
    .collect::<Vec<_>>()
    .join("\n");

    CommandResult::success_with_data("config", message, serde_json::to_value(&entries).ok())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("deskpilot.toml"), PathBuf::from("config/deskpilot.toml")]
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    fs::read_to_string(path).ok()?.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    match (file_doc, file_path) {
        (Some(doc), Some(path)) if contains_path(doc, key_path) => {
            format!("file ({})", path.display())
        }
        _ => "default".to_string(),
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn redact(secret: &Option<SecretString>) -> String {
    match secret {
        None => "<unset>".to_string(),
        Some(value) if value.expose_secret().trim().is_empty() => "<empty>".to_string(),
        Some(value) => {
            // Keep a short prefix so operators can tell keys apart.
            let visible: String = value.expose_secret().chars().take(3).collect();
            format!("{visible}***")
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, redact};

    #[test]
    fn redaction_never_reveals_more_than_a_prefix() {
        assert_eq!(redact(&None), "<unset>");
        assert_eq!(redact(&Some(SecretString::from("  ".to_string()))), "<empty>");
        assert_eq!(redact(&Some(SecretString::from("sk-abcdef123456".to_string()))), "sk-***");
    }

    #[test]
    fn nested_keys_are_found_in_file_doc() {
        let doc: Value = "[llm]\nmodel = \"qwen2.5\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "gateway.base_url"));
    }
}
