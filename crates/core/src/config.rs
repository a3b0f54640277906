use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub safety: SafetyConfig,
    pub flow: FlowConfig,
    pub server: ServerConfig,
    pub ledger: ServiceEndpointConfig,
    pub verification: ServiceEndpointConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    /// Cheaper model used for intent classification; falls back to `model`.
    pub classifier_model: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn classifier_model(&self) -> &str {
        self.classifier_model.as_deref().unwrap_or(&self.model)
    }
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub dimensions: usize,
}

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub min_score: f32,
    /// Text/markdown documents chunked into the in-memory index at startup.
    pub knowledge_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct SafetyConfig {
    pub per_minute: u32,
    pub per_hour: u32,
    pub script_floor: f32,
    pub gibberish_min_entropy: f32,
    pub max_input_chars: usize,
}

#[derive(Clone, Debug)]
pub struct FlowConfig {
    pub max_verification_attempts: u8,
    pub inactivity_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub graceful_shutdown_secs: u64,
}

/// HTTP collaborator reached through a base URL (ledger, secret verification).
#[derive(Clone, Debug)]
pub struct ServiceEndpointConfig {
    pub base_url: String,
    pub timeout_secs: u64,
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
    Anthropic,
    Ollama,
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
                url: "sqlite://tellr.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                classifier_model: None,
                temperature: 0.3,
                timeout_secs: 30,
                max_retries: 2,
            },
            embedding: EmbeddingConfig {
                base_url: None,
                model: "nomic-embed-text".to_string(),
                api_key: None,
                dimensions: 384,
            },
            retrieval: RetrievalConfig {
                top_k: 4,
                cache_ttl_secs: 120,
                cache_capacity: 128,
                min_score: 0.2,
                knowledge_dir: None,
            },
            safety: SafetyConfig {
                per_minute: 30,
                per_hour: 500,
                script_floor: 0.5,
                gibberish_min_entropy: 2.0,
                max_input_chars: 1000,
            },
            flow: FlowConfig { max_verification_attempts: 3, inactivity_timeout_secs: 600 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                request_timeout_secs: 20,
                graceful_shutdown_secs: 15,
            },
            ledger: ServiceEndpointConfig {
                base_url: "http://127.0.0.1:8000/api".to_string(),
                timeout_secs: 10,
            },
            verification: ServiceEndpointConfig {
                base_url: "http://127.0.0.1:8000/api".to_string(),
                timeout_secs: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
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
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tellr.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            set(&mut self.database.url, database.url);
            set(&mut self.database.max_connections, database.max_connections);
            set(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(llm) = patch.llm {
            set(&mut self.llm.provider, llm.provider);
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            set(&mut self.llm.model, llm.model);
            if let Some(classifier_model) = llm.classifier_model {
                self.llm.classifier_model = Some(classifier_model);
            }
            set(&mut self.llm.temperature, llm.temperature);
            set(&mut self.llm.timeout_secs, llm.timeout_secs);
            set(&mut self.llm.max_retries, llm.max_retries);
        }

        if let Some(embedding) = patch.embedding {
            if let Some(base_url) = embedding.base_url {
                self.embedding.base_url = Some(base_url);
            }
            set(&mut self.embedding.model, embedding.model);
            if let Some(api_key_value) = embedding.api_key {
                self.embedding.api_key = Some(secret_value(api_key_value));
            }
            set(&mut self.embedding.dimensions, embedding.dimensions);
        }

        if let Some(retrieval) = patch.retrieval {
            set(&mut self.retrieval.top_k, retrieval.top_k);
            set(&mut self.retrieval.cache_ttl_secs, retrieval.cache_ttl_secs);
            set(&mut self.retrieval.cache_capacity, retrieval.cache_capacity);
            set(&mut self.retrieval.min_score, retrieval.min_score);
            if retrieval.knowledge_dir.is_some() {
                self.retrieval.knowledge_dir = retrieval.knowledge_dir;
            }
        }

        if let Some(safety) = patch.safety {
            set(&mut self.safety.per_minute, safety.per_minute);
            set(&mut self.safety.per_hour, safety.per_hour);
            set(&mut self.safety.script_floor, safety.script_floor);
            set(&mut self.safety.gibberish_min_entropy, safety.gibberish_min_entropy);
            set(&mut self.safety.max_input_chars, safety.max_input_chars);
        }

        if let Some(flow) = patch.flow {
            set(&mut self.flow.max_verification_attempts, flow.max_verification_attempts);
            set(&mut self.flow.inactivity_timeout_secs, flow.inactivity_timeout_secs);
        }

        if let Some(server) = patch.server {
            set(&mut self.server.bind_address, server.bind_address);
            set(&mut self.server.port, server.port);
            set(&mut self.server.request_timeout_secs, server.request_timeout_secs);
            set(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(ledger) = patch.ledger {
            set(&mut self.ledger.base_url, ledger.base_url);
            set(&mut self.ledger.timeout_secs, ledger.timeout_secs);
        }

        if let Some(verification) = patch.verification {
            set(&mut self.verification.base_url, verification.base_url);
            set(&mut self.verification.timeout_secs, verification.timeout_secs);
        }

        if let Some(logging) = patch.logging {
            set(&mut self.logging.level, logging.level);
            set(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TELLR_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TELLR_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TELLR_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TELLR_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TELLR_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TELLR_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TELLR_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TELLR_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TELLR_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TELLR_LLM_CLASSIFIER_MODEL") {
            self.llm.classifier_model = Some(value);
        }
        if let Some(value) = read_env("TELLR_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("TELLR_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("TELLR_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TELLR_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TELLR_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("TELLR_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("TELLR_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(value);
        }
        if let Some(value) = read_env("TELLR_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = read_env("TELLR_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TELLR_EMBEDDING_DIMENSIONS") {
            self.embedding.dimensions = parse_usize("TELLR_EMBEDDING_DIMENSIONS", &value)?;
        }

        if let Some(value) = read_env("TELLR_RETRIEVAL_TOP_K") {
            self.retrieval.top_k = parse_usize("TELLR_RETRIEVAL_TOP_K", &value)?;
        }
        if let Some(value) = read_env("TELLR_RETRIEVAL_CACHE_TTL_SECS") {
            self.retrieval.cache_ttl_secs = parse_u64("TELLR_RETRIEVAL_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("TELLR_RETRIEVAL_CACHE_CAPACITY") {
            self.retrieval.cache_capacity =
                parse_usize("TELLR_RETRIEVAL_CACHE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("TELLR_RETRIEVAL_MIN_SCORE") {
            self.retrieval.min_score = parse_f32("TELLR_RETRIEVAL_MIN_SCORE", &value)?;
        }
        if let Some(value) = read_env("TELLR_RETRIEVAL_KNOWLEDGE_DIR") {
            self.retrieval.knowledge_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("TELLR_SAFETY_PER_MINUTE") {
            self.safety.per_minute = parse_u32("TELLR_SAFETY_PER_MINUTE", &value)?;
        }
        if let Some(value) = read_env("TELLR_SAFETY_PER_HOUR") {
            self.safety.per_hour = parse_u32("TELLR_SAFETY_PER_HOUR", &value)?;
        }
        if let Some(value) = read_env("TELLR_SAFETY_SCRIPT_FLOOR") {
            self.safety.script_floor = parse_f32("TELLR_SAFETY_SCRIPT_FLOOR", &value)?;
        }
        if let Some(value) = read_env("TELLR_SAFETY_MAX_INPUT_CHARS") {
            self.safety.max_input_chars = parse_usize("TELLR_SAFETY_MAX_INPUT_CHARS", &value)?;
        }

        if let Some(value) = read_env("TELLR_FLOW_MAX_VERIFICATION_ATTEMPTS") {
            self.flow.max_verification_attempts =
                parse_u8("TELLR_FLOW_MAX_VERIFICATION_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("TELLR_FLOW_INACTIVITY_TIMEOUT_SECS") {
            self.flow.inactivity_timeout_secs =
                parse_u64("TELLR_FLOW_INACTIVITY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TELLR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TELLR_SERVER_PORT") {
            self.server.port = parse_u16("TELLR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TELLR_SERVER_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs =
                parse_u64("TELLR_SERVER_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TELLR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TELLR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TELLR_LEDGER_BASE_URL") {
            self.ledger.base_url = value;
        }
        if let Some(value) = read_env("TELLR_VERIFICATION_BASE_URL") {
            self.verification.base_url = value;
        }

        let log_level = read_env("TELLR_LOGGING_LEVEL").or_else(|| read_env("TELLR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TELLR_LOGGING_FORMAT").or_else(|| read_env("TELLR_LOG_FORMAT"));
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
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_embedding(&self.embedding)?;
        validate_retrieval(&self.retrieval)?;
        validate_safety(&self.safety)?;
        validate_flow(&self.flow)?;
        validate_server(&self.server)?;
        validate_endpoint("ledger", &self.ledger)?;
        validate_endpoint("verification", &self.verification)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tellr.toml"), PathBuf::from("config/tellr.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
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

fn validate_embedding(embedding: &EmbeddingConfig) -> Result<(), ConfigError> {
    if embedding.dimensions == 0 {
        return Err(ConfigError::Validation(
            "embedding.dimensions must be greater than zero".to_string(),
        ));
    }

    if let Some(base_url) = &embedding.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "embedding.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if retrieval.top_k == 0 || retrieval.top_k > 20 {
        return Err(ConfigError::Validation("retrieval.top_k must be in range 1..=20".to_string()));
    }

    if retrieval.cache_capacity == 0 {
        return Err(ConfigError::Validation(
            "retrieval.cache_capacity must be greater than zero".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&retrieval.min_score) {
        return Err(ConfigError::Validation(
            "retrieval.min_score must be in range 0.0..=1.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_safety(safety: &SafetyConfig) -> Result<(), ConfigError> {
    if safety.per_minute == 0 || safety.per_hour < safety.per_minute {
        return Err(ConfigError::Validation(
            "safety.per_minute must be > 0 and safety.per_hour must be >= safety.per_minute"
                .to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&safety.script_floor) {
        return Err(ConfigError::Validation(
            "safety.script_floor must be in range 0.0..=1.0".to_string(),
        ));
    }

    if safety.max_input_chars == 0 {
        return Err(ConfigError::Validation(
            "safety.max_input_chars must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_flow(flow: &FlowConfig) -> Result<(), ConfigError> {
    if flow.max_verification_attempts == 0 {
        return Err(ConfigError::Validation(
            "flow.max_verification_attempts must be greater than zero".to_string(),
        ));
    }

    if flow.inactivity_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "flow.inactivity_timeout_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.request_timeout_secs == 0 || server.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "server.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_endpoint(section: &str, endpoint: &ServiceEndpointConfig) -> Result<(), ConfigError> {
    if !is_http_url(&endpoint.base_url) {
        return Err(ConfigError::Validation(format!(
            "{section}.base_url must start with http:// or https://"
        )));
    }

    if endpoint.timeout_secs == 0 || endpoint.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "{section}.timeout_secs must be in range 1..=300"
        )));
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

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    parse_env(key, value)
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    parse_env(key, value)
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    parse_env(key, value)
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    parse_env(key, value)
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    parse_env(key, value)
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    parse_env(key, value)
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    embedding: Option<EmbeddingPatch>,
    retrieval: Option<RetrievalPatch>,
    safety: Option<SafetyPatch>,
    flow: Option<FlowPatch>,
    server: Option<ServerPatch>,
    ledger: Option<EndpointPatch>,
    verification: Option<EndpointPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    classifier_model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingPatch {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    dimensions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    top_k: Option<usize>,
    cache_ttl_secs: Option<u64>,
    cache_capacity: Option<usize>,
    min_score: Option<f32>,
    knowledge_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SafetyPatch {
    per_minute: Option<u32>,
    per_hour: Option<u32>,
    script_floor: Option<f32>,
    gibberish_min_entropy: Option<f32>,
    max_input_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowPatch {
    max_verification_attempts: Option<u8>,
    inactivity_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    request_timeout_secs: Option<u64>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.retrieval.top_k == 4, "default top_k should be 4")?;
        ensure(config.retrieval.cache_ttl_secs == 120, "default cache ttl should be 120s")?;
        ensure(config.retrieval.cache_capacity == 128, "default cache capacity should be 128")?;
        ensure(config.safety.per_minute == 30, "default per-minute limit should be 30")?;
        ensure(config.safety.per_hour == 500, "default per-hour limit should be 500")?;
        ensure(
            config.flow.max_verification_attempts == 3,
            "default verification ceiling should be 3",
        )?;
        ensure(config.llm.classifier_model() == "llama3.1", "classifier should fall back to model")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TELLR_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tellr.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_TELLR_LLM_KEY}"
model = "gpt-4o-mini"
classifier_model = "gpt-4o-mini"

[retrieval]
top_k = 3
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-from-env".to_string()),
                "api key should be interpolated from environment",
            )?;
            ensure(config.retrieval.top_k == 3, "top_k should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_TELLR_LLM_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELLR_LOG_LEVEL", "warn");
        env::set_var("TELLR_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["TELLR_LOG_LEVEL", "TELLR_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELLR_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TELLR_SAFETY_PER_MINUTE", "12");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tellr.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[safety]
per_minute = 20
per_hour = 100

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.safety.per_minute == 12, "env per-minute limit should win over file")?;
            ensure(config.safety.per_hour == 100, "file per-hour limit should win over default")?;
            Ok(())
        })();

        clear_vars(&["TELLR_DATABASE_URL", "TELLR_SAFETY_PER_MINUTE"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELLR_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["TELLR_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELLR_RETRIEVAL_TOP_K", "many");

        let result = (|| -> Result<(), String> {
            let is_invalid = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "TELLR_RETRIEVAL_TOP_K"
            );
            ensure(is_invalid, "non-numeric top_k should be rejected")
        })();

        clear_vars(&["TELLR_RETRIEVAL_TOP_K"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELLR_LLM_API_KEY", "sk-secret-value");
        env::set_var("TELLR_EMBEDDING_API_KEY", "emb-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain llm key")?;
            ensure(
                !debug.contains("emb-secret-value"),
                "debug output should not contain embedding key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["TELLR_LLM_API_KEY", "TELLR_EMBEDDING_API_KEY"]);
        result
    }
}
