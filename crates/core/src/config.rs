use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::MAX_REPLY_TTL_SECS;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Messaging gateway REST root; outbound sends are disabled when absent.
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub instance_id: String,
    pub webhook_secret: Option<SecretString>,
    pub send_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalConfig {
    pub match_count: usize,
    pub alpha: f64,
    pub min_relevance: u8,
    pub max_context_documents: usize,
    pub fallback_candidates: usize,
    pub history_turns: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationConfig {
    pub reply_ttl_secs: i64,
    pub confirmation_text: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub gateway_base_url: Option<String>,
    pub gateway_api_key: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://deskpilot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gateway: GatewayConfig {
                base_url: None,
                api_key: None,
                instance_id: "default".to_string(),
                webhook_secret: None,
                send_timeout_secs: 15,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some(LlmProvider::Ollama.default_base_url().to_string()),
                model: "llama3.1".to_string(),
                embedding_model: "nomic-embed-text".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            retrieval: RetrievalConfig::default(),
            conversation: ConversationConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_count: 12,
            alpha: 0.5,
            min_relevance: 70,
            max_context_documents: 3,
            fallback_candidates: 5,
            history_turns: 5,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            reply_ttl_secs: 86_400,
            confirmation_text: "Resposta registrada no chamado. Obrigado!".to_string(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("deskpilot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Chat-completions root for the configured provider.
    pub fn llm_base_url(&self) -> String {
        self.llm
            .base_url
            .clone()
            .unwrap_or_else(|| self.llm.provider.default_base_url().to_string())
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(base_url) = gateway.base_url {
                self.gateway.base_url = Some(base_url);
            }
            if let Some(gateway_api_key_value) = gateway.api_key {
                self.gateway.api_key = Some(secret_value(gateway_api_key_value));
            }
            if let Some(instance_id) = gateway.instance_id {
                self.gateway.instance_id = instance_id;
            }
            if let Some(webhook_secret_value) = gateway.webhook_secret {
                self.gateway.webhook_secret = Some(secret_value(webhook_secret_value));
            }
            if let Some(send_timeout_secs) = gateway.send_timeout_secs {
                self.gateway.send_timeout_secs = send_timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(embedding_model) = llm.embedding_model {
                self.llm.embedding_model = embedding_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(match_count) = retrieval.match_count {
                self.retrieval.match_count = match_count;
            }
            if let Some(alpha) = retrieval.alpha {
                self.retrieval.alpha = alpha;
            }
            if let Some(min_relevance) = retrieval.min_relevance {
                self.retrieval.min_relevance = min_relevance;
            }
            if let Some(max_context_documents) = retrieval.max_context_documents {
                self.retrieval.max_context_documents = max_context_documents;
            }
            if let Some(fallback_candidates) = retrieval.fallback_candidates {
                self.retrieval.fallback_candidates = fallback_candidates;
            }
            if let Some(history_turns) = retrieval.history_turns {
                self.retrieval.history_turns = history_turns;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(reply_ttl_secs) = conversation.reply_ttl_secs {
                self.conversation.reply_ttl_secs = reply_ttl_secs;
            }
            if let Some(confirmation_text) = conversation.confirmation_text {
                self.conversation.confirmation_text = confirmation_text;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DESKPILOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DESKPILOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_number("DESKPILOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DESKPILOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_number("DESKPILOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DESKPILOT_GATEWAY_BASE_URL") {
            self.gateway.base_url = Some(value);
        }
        if let Some(value) = read_env("DESKPILOT_GATEWAY_API_KEY") {
            self.gateway.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DESKPILOT_GATEWAY_INSTANCE_ID") {
            self.gateway.instance_id = value;
        }
        if let Some(value) = read_env("DESKPILOT_GATEWAY_WEBHOOK_SECRET") {
            self.gateway.webhook_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("DESKPILOT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("DESKPILOT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DESKPILOT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("DESKPILOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DESKPILOT_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = value;
        }
        if let Some(value) = read_env("DESKPILOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_number("DESKPILOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DESKPILOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_number("DESKPILOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("DESKPILOT_RETRIEVAL_MATCH_COUNT") {
            self.retrieval.match_count = parse_number("DESKPILOT_RETRIEVAL_MATCH_COUNT", &value)?;
        }
        if let Some(value) = read_env("DESKPILOT_RETRIEVAL_ALPHA") {
            self.retrieval.alpha = parse_number("DESKPILOT_RETRIEVAL_ALPHA", &value)?;
        }
        if let Some(value) = read_env("DESKPILOT_RETRIEVAL_MIN_RELEVANCE") {
            self.retrieval.min_relevance =
                parse_number("DESKPILOT_RETRIEVAL_MIN_RELEVANCE", &value)?;
        }

        if let Some(value) = read_env("DESKPILOT_CONVERSATION_REPLY_TTL_SECS") {
            self.conversation.reply_ttl_secs =
                parse_number("DESKPILOT_CONVERSATION_REPLY_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("DESKPILOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DESKPILOT_SERVER_PORT") {
            self.server.port = parse_number("DESKPILOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DESKPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_number("DESKPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("DESKPILOT_LOGGING_LEVEL").or_else(|| read_env("DESKPILOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DESKPILOT_LOGGING_FORMAT").or_else(|| read_env("DESKPILOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(gateway_base_url) = overrides.gateway_base_url {
            self.gateway.base_url = Some(gateway_base_url);
        }
        if let Some(gateway_api_key) = overrides.gateway_api_key {
            self.gateway.api_key = Some(secret_value(gateway_api_key));
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_gateway(&self.gateway)?;
        validate_llm(&self.llm)?;
        validate_retrieval(&self.retrieval)?;
        validate_conversation(&self.conversation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("deskpilot.toml"), PathBuf::from("config/deskpilot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.instance_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.instance_id must not be empty; use the channel instance name configured in the gateway".to_string(),
        ));
    }

    if let Some(base_url) = &gateway.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "gateway.base_url must start with http:// or https://".to_string(),
            ));
        }
        let missing_key = gateway
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_key {
            return Err(ConfigError::Validation(
                "gateway.api_key is required when gateway.base_url is set (sent as the `apikey` header)".to_string(),
            ));
        }
    }

    if gateway.send_timeout_secs == 0 || gateway.send_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "gateway.send_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_retries > 10 {
        return Err(ConfigError::Validation("llm.max_retries must be at most 10".to_string()));
    }

    if llm.model.trim().is_empty() || llm.embedding_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model and llm.embedding_model must not be empty".to_string(),
        ));
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider (set DESKPILOT_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if retrieval.match_count == 0 || retrieval.match_count > 100 {
        return Err(ConfigError::Validation(
            "retrieval.match_count must be in range 1..=100".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&retrieval.alpha) {
        return Err(ConfigError::Validation(
            "retrieval.alpha must be in range 0.0..=1.0".to_string(),
        ));
    }
    if retrieval.min_relevance > 100 {
        return Err(ConfigError::Validation(
            "retrieval.min_relevance must be in range 0..=100".to_string(),
        ));
    }
    if retrieval.max_context_documents == 0 || retrieval.fallback_candidates == 0 {
        return Err(ConfigError::Validation(
            "retrieval.max_context_documents and retrieval.fallback_candidates must be greater than zero"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.reply_ttl_secs <= 0 || conversation.reply_ttl_secs > MAX_REPLY_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "conversation.reply_ttl_secs must be between 1 and {MAX_REPLY_TTL_SECS}"
        )));
    }
    if conversation.confirmation_text.trim().is_empty() {
        return Err(ConfigError::Validation(
            "conversation.confirmation_text must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    llm: Option<LlmPatch>,
    retrieval: Option<RetrievalPatch>,
    conversation: Option<ConversationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    instance_id: Option<String>,
    webhook_secret: Option<String>,
    send_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    match_count: Option<usize>,
    alpha: Option<f64>,
    min_relevance: Option<u8>,
    max_context_documents: Option<usize>,
    fallback_candidates: Option<usize>,
    history_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    reply_ttl_secs: Option<i64>,
    confirmation_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
