use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tellr_agent::Supervisor;
use tellr_core::domain::{Language, TurnResponse, Utterance, UtteranceContext};
use tellr_core::errors::{InterfaceError, TurnError};
use tellr_core::messages::{localize, MessageKey};
use tellr_db::DbPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::health;

#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Arc<Supervisor>,
    pub db_pool: DbPool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/converse", post(converse))
        .with_state(state)
}

/// Body of `POST /api/v1/converse`. `secret_code` travels beside the utterance, never inside it.
#[derive(Deserialize)]
pub struct ConverseRequest {
    pub text: String,
    pub language: String,
    pub session_id: String,
    #[serde(default)]
    pub context: Option<UtteranceContext>,
    #[serde(default)]
    pub secret_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub correlation_id: String,
    pub retryable: bool,
}

pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    let error = InterfaceError::BadRequest {
        message: message.into(),
        correlation_id: Uuid::new_v4().to_string(),
    };
    warn!(
        event_name = "http.converse.rejected",
        correlation_id = %error.correlation_id(),
        error = %error,
        "converse request rejected"
    );
    ApiError(error)
}

impl ConverseRequest {
    fn into_parts(self) -> Result<(Utterance, Option<SecretString>), ApiError> {
        let language = Language::from_tag(&self.language)
            .ok_or_else(|| bad_request(format!("unsupported language `{}`", self.language)))?;
        let session_id = self.session_id.trim();
        if session_id.is_empty() {
            return Err(bad_request("session_id must not be empty"));
        }
        let secret = self
            .secret_code
            .filter(|code| !code.trim().is_empty())
            .map(|code| SecretString::from(code.trim().to_string()));
        // the secure input may submit a code with no accompanying text
        if self.text.trim().is_empty() && secret.is_none() {
            return Err(bad_request("text must not be empty"));
        }

        let utterance = Utterance::new(self.text, language, session_id)
            .with_context(self.context.unwrap_or_default());
        Ok((utterance, secret))
    }
}

pub async fn converse(
    State(state): State<ApiState>,
    payload: Result<Json<ConverseRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    let (utterance, secret) = request.into_parts()?;
    let language = utterance.language;
    info!(
        event_name = "http.converse.received",
        session_id = %utterance.session_id,
        language = language.tag(),
        text_chars = utterance.text.chars().count(),
        has_secret = secret.is_some(),
        "converse request"
    );

    match state.supervisor.try_handle_turn(utterance, secret).await {
        Ok(response) => Ok((StatusCode::OK, Json(response)).into_response()),
        Err(TurnError::SessionBusy) => {
            let busy = TurnResponse::retryable(localize(MessageKey::SessionBusy, language));
            Ok((StatusCode::TOO_MANY_REQUESTS, Json(busy)).into_response())
        }
        Err(error) => {
            let retry = TurnResponse::retryable(localize(MessageKey::RetryLater, language));
            warn!(event_name = "http.converse.failed", error = %error, "turn failed");
            Ok((StatusCode::OK, Json(retry)).into_response())
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use tellr_agent::collaborators::{InMemoryLedger, SecretVerifier};
    use tellr_agent::llm::{ChatMessage, LanguageModel, SamplingParams};
    use tellr_agent::retrieval::{HashingEmbedder, InMemoryVectorIndex};
    use tellr_agent::supervisor::{Collaborators, Supervisor};
    use tellr_core::audit::InMemoryAuditSink;
    use tellr_core::config::AppConfig;
    use tellr_core::domain::{AccountBalance, AccountId, Language, Payee, SessionId};
    use tellr_core::errors::CollaboratorError;
    use tellr_db::{connect_with_settings, migrations, SqlSessionStore};

    use super::ApiState;

    pub struct FixedModel;

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _language: Language,
            _params: &SamplingParams,
        ) -> Result<String, CollaboratorError> {
            Ok("Happy to help.".to_string())
        }

        async fn classify(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            Ok("other".to_string())
        }
    }

    pub struct AcceptingVerifier;

    #[async_trait]
    impl SecretVerifier for AcceptingVerifier {
        async fn verify(
            &self,
            _secret: &secrecy::SecretString,
            _session_id: &SessionId,
        ) -> Result<bool, CollaboratorError> {
            Ok(true)
        }
    }

    pub async fn state_with_pool() -> ApiState {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let config = AppConfig::default();
        let ledger = InMemoryLedger::new(
            vec![AccountBalance {
                account_id: AccountId("001234567890".to_string()),
                account_type: "savings".to_string(),
                available: Decimal::new(1_000_000, 2),
                currency: "INR".to_string(),
            }],
            vec![Payee {
                payee_id: "payee-ravi".to_string(),
                display_name: "Ravi Kumar".to_string(),
                aliases: vec!["ravi".to_string()],
            }],
        );
        let supervisor = Supervisor::from_config(
            &config,
            Collaborators {
                model: Arc::new(FixedModel),
                embedder: Arc::new(HashingEmbedder::new(config.embedding.dimensions)),
                index: Arc::new(InMemoryVectorIndex::new()),
                ledger: Arc::new(ledger),
                verifier: Arc::new(AcceptingVerifier),
                store: Arc::new(SqlSessionStore::new(pool.clone())),
                audit: Arc::new(InMemoryAuditSink::default()),
            },
        );
        ApiState { supervisor: Arc::new(supervisor), db_pool: pool }
    }
}
