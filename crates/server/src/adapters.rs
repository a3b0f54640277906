//! REST clients for the core-banking CRUD API and the secret-code verification service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tellr_agent::collaborators::{LedgerService, SecretVerifier};
use tellr_core::config::ServiceEndpointConfig;
use tellr_core::domain::{
    AccountBalance, AccountId, Payee, SessionId, Transaction, TransferConfirmation, TransferRequest,
};
use tellr_core::errors::CollaboratorError;
use tracing::{debug, warn};

fn http_client(config: &ServiceEndpointConfig, collaborator: &'static str) -> Result<Client, CollaboratorError> {
    Client::builder().timeout(Duration::from_secs(config.timeout_secs.max(1))).build().map_err(|error| {
        CollaboratorError::Unavailable {
            collaborator,
            message: format!("failed to build HTTP client: {error}"),
        }
    })
}

fn base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Shared request plumbing: transport errors, status mapping and JSON decoding.
#[derive(Clone, Debug)]
struct JsonEndpoint {
    client: Client,
    base_url: String,
    collaborator: &'static str,
    timeout_ms: u64,
}

impl JsonEndpoint {
    fn new(config: &ServiceEndpointConfig, collaborator: &'static str) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: http_client(config, collaborator)?,
            base_url: base(&config.base_url),
            collaborator,
            timeout_ms: config.timeout_secs.max(1).saturating_mul(1000),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CollaboratorError> {
        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                CollaboratorError::Timeout { collaborator: self.collaborator, after_ms: self.timeout_ms }
            } else {
                CollaboratorError::Unavailable { collaborator: self.collaborator, message: error.to_string() }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "collaborator.request_failed",
                collaborator = self.collaborator,
                status = status.as_u16(),
                "collaborator returned an error status"
            );
            return Err(status_error(self.collaborator, status));
        }

        response.json::<T>().await.map_err(|error| CollaboratorError::InvalidResponse {
            collaborator: self.collaborator,
            message: format!("failed to parse response body: {error}"),
        })
    }
}

/// 4xx answers are final; 408, 429 and 5xx may clear on retry.
fn status_error(collaborator: &'static str, status: StatusCode) -> CollaboratorError {
    let message = format!("status {}", status.as_u16());
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::REQUEST_TIMEOUT {
        CollaboratorError::Rejected { collaborator, message }
    } else {
        CollaboratorError::Unavailable { collaborator, message }
    }
}

/// Ledger access over the banking CRUD API, scoped to the caller's session.
#[derive(Clone, Debug)]
pub struct HttpLedgerClient {
    endpoint: JsonEndpoint,
}

impl HttpLedgerClient {
    pub fn from_config(config: &ServiceEndpointConfig) -> Result<Self, CollaboratorError> {
        Ok(Self { endpoint: JsonEndpoint::new(config, "ledger")? })
    }
}

#[async_trait]
impl LedgerService for HttpLedgerClient {
    async fn balances(&self, session_id: &SessionId) -> Result<Vec<AccountBalance>, CollaboratorError> {
        let url = self.endpoint.url(&format!("sessions/{}/accounts", session_id.0));
        self.endpoint.send(self.endpoint.client.get(url)).await
    }

    async fn transactions(
        &self,
        session_id: &SessionId,
        account_id: &AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, CollaboratorError> {
        let url = self
            .endpoint
            .url(&format!("sessions/{}/accounts/{}/transactions", session_id.0, account_id.0));
        let request = self.endpoint.client.get(url).query(&[("limit", limit)]);
        self.endpoint.send(request).await
    }

    async fn payees(&self, session_id: &SessionId) -> Result<Vec<Payee>, CollaboratorError> {
        let url = self.endpoint.url(&format!("sessions/{}/payees", session_id.0));
        self.endpoint.send(self.endpoint.client.get(url)).await
    }

    async fn execute_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<TransferConfirmation, CollaboratorError> {
        debug!(
            event_name = "ledger.transfer_submitted",
            reference_id = %request.reference_id,
            "submitting transfer"
        );
        let url = self.endpoint.url("transfers");
        self.endpoint.send(self.endpoint.client.post(url).json(&request)).await
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    session_id: &'a str,
    secret_code: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    verified: bool,
}

/// Pass/fail check of a transaction secret code. The code is sent once and never logged.
#[derive(Clone, Debug)]
pub struct HttpSecretVerifier {
    endpoint: JsonEndpoint,
}

impl HttpSecretVerifier {
    pub fn from_config(config: &ServiceEndpointConfig) -> Result<Self, CollaboratorError> {
        Ok(Self { endpoint: JsonEndpoint::new(config, "secret_verifier")? })
    }
}

#[async_trait]
impl SecretVerifier for HttpSecretVerifier {
    async fn verify(&self, secret: &SecretString, session_id: &SessionId) -> Result<bool, CollaboratorError> {
        let body = VerifyRequest { session_id: &session_id.0, secret_code: secret.expose_secret() };
        let url = self.endpoint.url("verify");
        let response: VerifyResponse = self.endpoint.send(self.endpoint.client.post(url).json(&body)).await?;
        Ok(response.verified)
    }
}
