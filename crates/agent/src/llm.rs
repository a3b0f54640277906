use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tellr_core::config::{LlmConfig, LlmProvider};
use tellr_core::domain::Language;
use tellr_core::errors::CollaboratorError;
use tracing::{debug, warn};

use crate::prompts;

const COLLABORATOR: &str = "language_model";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl SamplingParams {
    /// Deterministic settings for label-only calls.
    pub fn classification() -> Self {
        Self { temperature: 0.0, max_tokens: Some(8) }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self { temperature: 0.3, max_tokens: Some(400) }
    }
}

/// Language-model service. Streaming is out of scope: replies are safety-checked as one
/// completed string.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        language: Language,
        params: &SamplingParams,
    ) -> Result<String, CollaboratorError>;

    /// Cheaper label-only call used by the intent router.
    async fn classify(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Adapter for any endpoint implementing `/v1/chat/completions` (OpenAI, Ollama, Anthropic's
/// compatibility layer).
#[derive(Clone)]
pub struct OpenAiCompatibleModel {
    client: Client,
    endpoint: String,
    model: String,
    classifier_model: String,
    api_key: Option<SecretString>,
    timeout_ms: u64,
}

impl std::fmt::Debug for OpenAiCompatibleModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleModel")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("classifier_model", &self.classifier_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl OpenAiCompatibleModel {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CollaboratorError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| CollaboratorError::Unavailable {
                collaborator: COLLABORATOR,
                message: format!("failed to build HTTP client: {error}"),
            })?;

        Ok(Self {
            client,
            endpoint: chat_completions_url(&base_url),
            model: config.model.clone(),
            classifier_model: config.classifier_model().to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout_secs.saturating_mul(1000),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        params: &SamplingParams,
    ) -> Result<String, CollaboratorError> {
        let payload = ChatCompletionRequest {
            model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };
        debug!(
            event_name = "llm.request",
            model = %model,
            messages = payload.messages.len(),
            "sending chat completion request"
        );

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|error| self.transport_error(error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "llm.request_failed",
                status = status.as_u16(),
                "chat completion endpoint returned an error status"
            );
            return Err(status_error(status, &body));
        }

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|error| {
            CollaboratorError::InvalidResponse {
                collaborator: COLLABORATOR,
                message: format!("failed to parse response body: {error}"),
            }
        })?;
        first_choice_text(parsed)
    }

    fn transport_error(&self, error: reqwest::Error) -> CollaboratorError {
        if error.is_timeout() {
            CollaboratorError::Timeout { collaborator: COLLABORATOR, after_ms: self.timeout_ms }
        } else {
            CollaboratorError::Unavailable { collaborator: COLLABORATOR, message: error.to_string() }
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        language: Language,
        params: &SamplingParams,
    ) -> Result<String, CollaboratorError> {
        let mut messages = messages.to_vec();
        messages.insert(0, ChatMessage::system(prompts::language_instruction(language)));
        self.complete(&self.model, messages, params).await
    }

    async fn classify(&self, prompt: &str) -> Result<String, CollaboratorError> {
        self.complete(
            &self.classifier_model,
            vec![ChatMessage::user(prompt)],
            &SamplingParams::classification(),
        )
        .await
    }
}

pub fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

/// Accepts a bare host, a `/v1` base, or the full completions URL.
fn chat_completions_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else if trimmed.ends_with("/v1") {
        format!("{trimmed}/chat/completions")
    } else {
        format!("{trimmed}/v1/chat/completions")
    }
}

fn status_error(status: reqwest::StatusCode, body: &str) -> CollaboratorError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| format!("http status {}", status.as_u16()));
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        CollaboratorError::Unavailable { collaborator: COLLABORATOR, message }
    } else {
        CollaboratorError::Rejected { collaborator: COLLABORATOR, message }
    }
}

fn first_choice_text(response: ChatCompletionResponse) -> Result<String, CollaboratorError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| CollaboratorError::InvalidResponse {
            collaborator: COLLABORATOR,
            message: "empty or missing content in response".to_string(),
        })
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use tellr_core::config::AppConfig;
    use tellr_core::errors::CollaboratorError;

    use super::{
        chat_completions_url, first_choice_text, status_error, ChatCompletionRequest,
        ChatCompletionResponse, ChatMessage, OpenAiCompatibleModel, SamplingParams,
    };

    #[test]
    fn completions_url_accepts_common_base_shapes() {
        assert_eq!(
            chat_completions_url("http://localhost:11434"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("http://proxy/v1/chat/completions"),
            "http://proxy/v1/chat/completions"
        );
    }

    #[test]
    fn request_serializes_roles_in_lowercase() {
        let request = ChatCompletionRequest {
            model: "llama3.1",
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            temperature: 0.0,
            max_tokens: None,
        };
        let json = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn first_choice_is_trimmed_and_empty_is_invalid() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  knowledge_query \n"}}]}"#,
        )
        .expect("parse response");
        assert_eq!(first_choice_text(parsed).expect("text"), "knowledge_query");

        let empty: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[]}"#).expect("parse response");
        assert!(matches!(first_choice_text(empty), Err(CollaboratorError::InvalidResponse { .. })));
    }

    #[test]
    fn status_errors_split_outages_from_rejections() {
        let outage = status_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(outage.is_transient());

        let rejected = status_error(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"invalid api key"}}"#,
        );
        assert_eq!(
            rejected,
            CollaboratorError::Rejected {
                collaborator: "language_model",
                message: "invalid api key".to_string()
            }
        );
    }

    #[test]
    fn adapter_debug_never_shows_the_key() {
        let mut config = AppConfig::default().llm;
        config.api_key = Some("sk-very-secret".to_string().into());
        let model = OpenAiCompatibleModel::from_config(&config).expect("build adapter");
        let debug = format!("{model:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert_eq!(model.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(SamplingParams::classification().temperature, 0.0);
    }
}
