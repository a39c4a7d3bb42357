use secrecy::ExposeSecret;
use serde::Serialize;

use deskpilot_core::config::{AppConfig, LlmProvider, LoadOptions};
use deskpilot_db::{connect_with_settings, migrations};

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ),
            check_database(&config),
            check_llm_provider(&config),
            check_gateway(&config),
        ],
        Err(error) => {
            let mut checks =
                vec![DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string())];
            checks.extend(["database_connectivity", "llm_provider_readiness", "gateway_mode"].map(
                |name| {
                    DoctorCheck::new(
                        name,
                        CheckStatus::Skipped,
                        "skipped because configuration did not load",
                    )
                },
            ));
            checks
        }
    };

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = if failed {
        (CheckStatus::Fail, "doctor: one or more readiness checks failed")
    } else if warned {
        (CheckStatus::Warn, "doctor: ready with warnings")
    } else {
        (CheckStatus::Pass, "doctor: all readiness checks passed")
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let pending = migrations::run_pending(&pool)
            .await
            .map_err(|error| format!("migrations failed: {error}"));
        pool.close().await;
        pending
    });

    match result {
        Ok(()) => DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            format!("connected and migrated `{}`", config.database.url),
        ),
        Err(error) => DoctorCheck::new("database_connectivity", CheckStatus::Fail, error),
    }
}

fn check_llm_provider(config: &AppConfig) -> DoctorCheck {
    let base_url =
        config.llm.base_url.as_deref().unwrap_or(config.llm.provider.default_base_url());
    let has_key = config
        .llm
        .api_key
        .as_ref()
        .is_some_and(|key| !key.expose_secret().trim().is_empty());

    match (config.llm.provider, has_key) {
        (LlmProvider::OpenAi, false) => DoctorCheck::new(
            "llm_provider_readiness",
            CheckStatus::Fail,
            "openai provider requires llm.api_key",
        ),
        (provider, _) => DoctorCheck::new(
            "llm_provider_readiness",
            CheckStatus::Pass,
            format!(
                "{} at {base_url} (model `{}`, embeddings `{}`)",
                provider.as_str(),
                config.llm.model,
                config.llm.embedding_model
            ),
        ),
    }
}

fn check_gateway(config: &AppConfig) -> DoctorCheck {
    match config.gateway.base_url.as_deref() {
        Some(base_url) => DoctorCheck::new(
            "gateway_mode",
            CheckStatus::Pass,
            format!("sending via {base_url} as instance `{}`", config.gateway.instance_id),
        ),
        None => DoctorCheck::new(
            "gateway_mode",
            CheckStatus::Warn,
            "gateway.base_url unset; outbound messages are logged and skipped",
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    std::iter::once(report.summary.clone())
        .chain(report.checks.iter().map(|check| {
            let marker = match check.status {
                CheckStatus::Pass => "ok",
                CheckStatus::Warn => "warn",
                CheckStatus::Fail => "fail",
                CheckStatus::Skipped => "skip",
            };
            format!("- [{marker}] {}: {}", check.name, check.details)
        }))
        .collect::<Vec<_>>()
        .join("\n")
}
