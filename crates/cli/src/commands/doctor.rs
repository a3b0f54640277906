use serde::Serialize;
use tellr_core::chunker::SourceDocument;
use tellr_core::config::{AppConfig, LoadOptions};
use tellr_db::{connect_with_config, migrations, ping};

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

/// Exit code 0 unless a check fails; warnings do not fail the run.
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
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_embedder(&config));
            checks.push(check_knowledge_dir(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["embedder", "knowledge_directory", "database_connectivity"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_embedder(config: &AppConfig) -> DoctorCheck {
    match &config.embedding.base_url {
        Some(base_url) => DoctorCheck::new(
            "embedder",
            CheckStatus::Pass,
            format!("remote embeddings via `{base_url}` ({})", config.embedding.model),
        ),
        None => DoctorCheck::new(
            "embedder",
            CheckStatus::Warn,
            format!(
                "no embedding endpoint; offline hashing embedder with {} dimensions",
                config.embedding.dimensions
            ),
        ),
    }
}

fn check_knowledge_dir(config: &AppConfig) -> DoctorCheck {
    let Some(dir) = &config.retrieval.knowledge_dir else {
        return DoctorCheck::new(
            "knowledge_directory",
            CheckStatus::Warn,
            "retrieval.knowledge_dir is unset; knowledge answers will have no grounding",
        );
    };

    match SourceDocument::load_directory(dir) {
        Ok(documents) if documents.is_empty() => DoctorCheck::new(
            "knowledge_directory",
            CheckStatus::Warn,
            format!("`{}` holds no text or markdown documents", dir.display()),
        ),
        Ok(documents) => DoctorCheck::new(
            "knowledge_directory",
            CheckStatus::Pass,
            format!("{} documents readable in `{}`", documents.len(), dir.display()),
        ),
        Err(error) => DoctorCheck::new(
            "knowledge_directory",
            CheckStatus::Fail,
            format!("`{}` could not be read: {error}", dir.display()),
        ),
    }
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
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let outcome = async {
            ping(&pool).await.map_err(|error| format!("database query failed: {error}"))?;
            migrations::pending_count(&pool)
                .await
                .map_err(|error| format!("failed to inspect migrations: {error}"))
        }
        .await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(0) => DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            "database reachable and schema up to date",
        ),
        Ok(pending) => DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Warn,
            format!("database reachable; {pending} migrations pending (run `tellr migrate`)"),
        ),
        Err(error) => DoctorCheck::new("database_connectivity", CheckStatus::Fail, error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
