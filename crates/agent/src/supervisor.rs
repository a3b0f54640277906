use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use secrecy::SecretString;
use tellr_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use tellr_core::config::AppConfig;
use tellr_core::domain::{
    ActiveFlow, ConversationState, GuardrailVerdict, Intent, Language, SessionId, SidePayload,
    TurnResponse, Utterance, ViolationCategory,
};
use tellr_core::errors::TurnError;
use tellr_core::flows::{FlowContext, FlowEngine, PaymentEvent, PaymentFlow, PaymentState};
use tellr_core::messages::{localize, MessageKey};
use tellr_core::session::{SessionStore, Speaker, TurnRecord};
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agents::{AgentDependencies, AgentOutcome, AgentRegistry, ReplySource, TurnContext};
use crate::collaborators::{LedgerService, SecretVerifier};
use crate::guardrails::SafetyFilter;
use crate::llm::LanguageModel;
use crate::retrieval::{Embedder, Retriever, RetrieverSettings, VectorIndex};
use crate::retry::{with_retries, RetryPolicy};
use crate::router::IntentRouter;
use crate::slots::{is_cancellation, scrub_for_history};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SupervisorSettings {
    /// Budget for routing plus agent work in one turn.
    pub turn_timeout: Duration,
    pub inactivity_timeout: Duration,
    pub max_verification_attempts: u8,
    pub retry: RetryPolicy,
}

impl SupervisorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            turn_timeout: Duration::from_secs(config.server.request_timeout_secs),
            inactivity_timeout: Duration::from_secs(config.flow.inactivity_timeout_secs),
            max_verification_attempts: config.flow.max_verification_attempts,
            retry: RetryPolicy::new(config.llm.max_retries),
        }
    }
}

/// External collaborators the engine is assembled from.
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub ledger: Arc<dyn LedgerService>,
    pub verifier: Arc<dyn SecretVerifier>,
    pub store: Arc<dyn SessionStore>,
    pub audit: Arc<dyn AuditSink>,
}

/// Owns the per-turn pipeline: input safety, state load, routing, dispatch, output safety and
/// persistence. Turns for one session never interleave; a second concurrent turn is answered
/// with a busy reply instead of waiting.
pub struct Supervisor {
    safety: SafetyFilter,
    router: IntentRouter,
    agents: AgentRegistry,
    store: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    engine: FlowEngine<PaymentFlow>,
    sessions: DashMap<SessionId, Arc<Mutex<()>>>,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(
        safety: SafetyFilter,
        router: IntentRouter,
        agents: AgentRegistry,
        store: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            safety,
            router,
            agents,
            store,
            audit,
            engine: FlowEngine::default(),
            sessions: DashMap::new(),
            settings,
        }
    }

    pub fn from_config(config: &AppConfig, collaborators: Collaborators) -> Self {
        let settings = SupervisorSettings::from_config(config);
        let retriever = Arc::new(Retriever::new(
            collaborators.embedder,
            collaborators.index,
            RetrieverSettings::from_config(&config.retrieval, config.llm.max_retries),
        ));
        let agents = AgentRegistry::new(AgentDependencies {
            ledger: collaborators.ledger,
            verifier: collaborators.verifier,
            model: collaborators.model.clone(),
            retriever,
            flow: config.flow.clone(),
            retry: settings.retry,
        });
        Self::new(
            SafetyFilter::new(&config.safety),
            IntentRouter::new(collaborators.model, settings.retry),
            agents,
            collaborators.store,
            collaborators.audit,
            settings,
        )
    }

    pub fn settings(&self) -> SupervisorSettings {
        self.settings
    }

    /// Handles one utterance end to end. Never fails: every error becomes a user-facing reply,
    /// with `retryable` set when trying again may help.
    pub async fn handle_turn(&self, utterance: Utterance, secret: Option<SecretString>) -> TurnResponse {
        let language = utterance.language;
        match self.try_handle_turn(utterance, secret).await {
            Ok(response) => response,
            Err(_) => TurnResponse::retryable(localize(MessageKey::SessionBusy, language)),
        }
    }

    /// Like [`Supervisor::handle_turn`], but reports a concurrent turn for the same session as
    /// `TurnError::SessionBusy` so transports can map it to their own status.
    pub async fn try_handle_turn(
        &self,
        utterance: Utterance,
        secret: Option<SecretString>,
    ) -> Result<TurnResponse, TurnError> {
        let correlation_id = Uuid::new_v4().to_string();
        let session_id = utterance.session_id.clone();
        let audit = AuditContext::new(Some(session_id.clone()), correlation_id.clone(), "supervisor");
        let span = info_span!("turn", session_id = %session_id, correlation_id = %correlation_id);

        let gate = self.sessions.entry(session_id.clone()).or_default().clone();
        let response = match gate.try_lock() {
            Ok(_guard) => Ok(self.run_turn(&utterance, secret.as_ref(), &audit).instrument(span).await),
            Err(_) => {
                self.emit(
                    AuditEvent::from_context(
                        &audit,
                        "turn.session_busy",
                        AuditCategory::System,
                        AuditOutcome::Rejected,
                    ),
                );
                warn!(event_name = "turn.session_busy", session_id = %session_id, "concurrent turn rejected");
                Err(TurnError::SessionBusy)
            }
        };
        drop(gate);
        self.sessions.remove_if(&session_id, |_, gate| Arc::strong_count(gate) == 1);
        response
    }

    async fn run_turn(
        &self,
        utterance: &Utterance,
        secret: Option<&SecretString>,
        audit: &AuditContext,
    ) -> TurnResponse {
        let started = Instant::now();
        let language = utterance.language;

        let verdict = if utterance.text.trim().is_empty() && secret.is_some() {
            self.safety.check_secret_submission(language, &utterance.session_id)
        } else {
            self.safety.check_input(&utterance.text, language, &utterance.session_id)
        };
        if let GuardrailVerdict::Fail { category, message } = verdict {
            self.emit(
                AuditEvent::from_context(
                    audit,
                    "safety.input_rejected",
                    AuditCategory::Safety,
                    AuditOutcome::Rejected,
                )
                .with_metadata("category", category.as_str()),
            );
            info!(event_name = "safety.input_rejected", category = category.as_str(), "input refused");
            return TurnResponse::text(message);
        }

        let mut state = match self.load_state(&utterance.session_id, audit).await {
            Ok(state) => state,
            Err(error) => return self.retry_later(audit, language, &error),
        };

        let mut notice = None;
        if state.has_active_flow() {
            let timeout = chrono::Duration::from_std(self.settings.inactivity_timeout)
                .unwrap_or_else(|_| chrono::Duration::weeks(52));
            if state.is_inactive(Utc::now(), timeout) {
                self.close_flow(&mut state, PaymentEvent::TimedOut, audit);
                notice = Some(localize(MessageKey::FlowTimedOut, language));
            } else if is_cancellation(&utterance.text) {
                self.close_flow(&mut state, PaymentEvent::CancelRequested, audit);
                let outcome = AgentOutcome::reply(localize(MessageKey::FlowCancelled, language), state);
                return self
                    .commit(utterance, audit, Intent::Other, outcome, Some(PaymentState::Cancelled), None, started)
                    .await;
            }
        }

        let context = TurnContext {
            utterance,
            secret,
            audit,
            audit_sink: self.audit.as_ref(),
            store: self.store.as_ref(),
        };
        let dispatched =
            match tokio::time::timeout(self.settings.turn_timeout, self.dispatch(&context, state.clone())).await {
                Ok(result) => result,
                Err(_) => Err(TurnError::Timeout { after_ms: self.settings.turn_timeout.as_millis() as u64 }),
            };

        match dispatched {
            Ok((intent, outcome)) => {
                let flow_state = outcome.state.payment_state();
                let outcome = self.screen_output(outcome, language, audit);
                self.commit(utterance, audit, intent, outcome, flow_state, notice, started).await
            }
            Err(TurnError::NoGroundingAvailable) => {
                let outcome = AgentOutcome::reply(localize(MessageKey::NoInformation, language), state);
                self.commit(utterance, audit, Intent::KnowledgeQuery, outcome, None, notice, started).await
            }
            Err(TurnError::SafetyRejection { category }) => {
                TurnResponse::text(localize(MessageKey::refusal_for(category), language))
            }
            Err(TurnError::SessionStateCorruption(message)) => {
                self.emit(
                    AuditEvent::from_context(
                        audit,
                        "session.state_corrupted",
                        AuditCategory::System,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("stage", "dispatch"),
                );
                error!(event_name = "session.state_corrupted", error = %message, "flow reset");
                state.reset_flow();
                let outcome = AgentOutcome::reply(localize(MessageKey::SafetyFallback, language), state);
                self.commit(utterance, audit, Intent::Other, outcome, None, notice, started).await
            }
            Err(TurnError::FlowSlotMismatch { expected }) => {
                warn!(event_name = "flow.slot_mismatch", expected, "utterance did not fit the flow");
                let outcome = AgentOutcome::reply(localize(MessageKey::FallbackHelp, language), state);
                self.commit(utterance, audit, Intent::Other, outcome, None, notice, started).await
            }
            Err(error) => self.retry_later(audit, language, &error),
        }
    }

    async fn dispatch(
        &self,
        context: &TurnContext<'_>,
        state: ConversationState,
    ) -> Result<(Intent, AgentOutcome), TurnError> {
        let decision = self.router.route(context.utterance, &state).await?;
        self.emit(
            AuditEvent::from_context(
                context.audit,
                "routing.intent_classified",
                AuditCategory::Routing,
                AuditOutcome::Success,
            )
            .with_metadata("intent", decision.intent.as_label())
            .with_metadata("source", decision.source.as_str()),
        );

        let agent = self.agents.for_intent(decision.intent);
        let outcome = agent.handle(context, state).await?;
        Ok((decision.intent, outcome))
    }

    /// Loads the session, resetting flows the state machine would not accept and flows that
    /// already finished.
    async fn load_state(
        &self,
        session_id: &SessionId,
        audit: &AuditContext,
    ) -> Result<ConversationState, TurnError> {
        let loaded = with_retries(self.settings.retry, "session.load", || self.store.load(session_id)).await?;
        let mut state = loaded.unwrap_or_else(|| ConversationState::new(session_id.clone()));

        if let Err(error) = state.validate() {
            self.emit(
                AuditEvent::from_context(
                    audit,
                    "session.state_corrupted",
                    AuditCategory::System,
                    AuditOutcome::Failed,
                )
                .with_metadata("stage", "load"),
            );
            error!(event_name = "session.state_corrupted", error = %error, "stored flow discarded");
            state.reset_flow();
        }
        if state.flow.as_ref().is_some_and(ActiveFlow::is_finished) {
            state.reset_flow();
        }
        Ok(state)
    }

    fn close_flow(&self, state: &mut ConversationState, event: PaymentEvent, audit: &AuditContext) {
        if let Some(ActiveFlow::Payment(slots)) = &state.flow {
            let context =
                FlowContext::with_attempts(slots.verification_attempts, self.settings.max_verification_attempts);
            if let Err(error) =
                self.engine.apply_with_audit(&slots.state, &event, &context, self.audit.as_ref(), audit)
            {
                warn!(event_name = "flow.close_rejected", error = %error, "flow closed without transition");
            }
        }
        state.reset_flow();
    }

    /// Generated replies get the full output check. Templated replies are localized already, so
    /// only PII is redacted, sparing references this flow issued. Payload display strings are
    /// redacted either way.
    fn screen_output(&self, outcome: AgentOutcome, language: Language, audit: &AuditContext) -> AgentOutcome {
        let AgentOutcome { reply, source, mut payload, state } = outcome;

        let payload_redactions = payload.as_mut().map(|payload| self.safety.redact_payload(payload)).unwrap_or(0);
        if payload_redactions > 0 {
            self.emit(
                AuditEvent::from_context(
                    audit,
                    "safety.output_sanitized",
                    AuditCategory::Safety,
                    AuditOutcome::Rejected,
                )
                .with_metadata("category", ViolationCategory::Pii.as_str())
                .with_metadata("target", "payload")
                .with_metadata("redactions", payload_redactions.to_string()),
            );
        }

        let verdict = match source {
            ReplySource::Generated => self.safety.check_output(&reply, language),
            ReplySource::Template => {
                let mut issued: Vec<&str> =
                    payload.as_ref().and_then(SidePayload::reference).into_iter().collect();
                if let Some(ActiveFlow::Payment(slots)) = &state.flow {
                    issued.push(&slots.reference_id);
                }
                self.safety.check_templated_output(&reply, &issued)
            }
        };
        let Some(category) = verdict.category() else {
            return AgentOutcome { reply, source, payload, state };
        };

        let event_type = if verdict.is_pass() { "safety.output_sanitized" } else { "safety.output_rejected" };
        self.emit(
            AuditEvent::from_context(audit, event_type, AuditCategory::Safety, AuditOutcome::Rejected)
                .with_metadata("category", category.as_str()),
        );

        let screened = verdict.resolve(&reply).to_string();
        let payload = match payload {
            Some(SidePayload::KnowledgeCard { .. }) if category != ViolationCategory::Pii => None,
            other => other,
        };
        AgentOutcome { reply: screened, source, payload, state }
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        utterance: &Utterance,
        audit: &AuditContext,
        intent: Intent,
        outcome: AgentOutcome,
        flow_state: Option<PaymentState>,
        notice: Option<&'static str>,
        started: Instant,
    ) -> TurnResponse {
        let AgentOutcome { reply, payload, mut state, .. } = outcome;
        state.finish_turn(intent);

        if let Err(error) = with_retries(self.settings.retry, "session.save", || self.store.save(&state)).await {
            self.emit(
                AuditEvent::from_context(audit, "session.save_failed", AuditCategory::System, AuditOutcome::Failed)
                    .with_metadata("intent", intent.as_label()),
            );
            error!(event_name = "session.save_failed", error = %error, "conversation state not persisted");
            return self.retry_later(audit, utterance.language, &TurnError::from(error));
        }
        let records = [
            TurnRecord::new(
                state.session_id.clone(),
                state.turn,
                Speaker::User,
                scrub_for_history(&utterance.text),
                Some(intent),
            ),
            TurnRecord::new(state.session_id.clone(), state.turn, Speaker::Assistant, reply.clone(), Some(intent)),
        ];
        for record in records {
            if let Err(error) = self.store.append_turn(record).await {
                warn!(event_name = "session.history_failed", error = %error, "turn history not recorded");
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let mut event =
            AuditEvent::from_context(audit, "turn.completed", AuditCategory::System, AuditOutcome::Success)
                .with_metadata("intent", intent.as_label())
                .with_metadata("latency_ms", latency_ms.to_string());
        if let Some(flow_state) = flow_state {
            event = event.with_metadata("flow_state", flow_state.as_str());
        }
        self.emit(event);
        info!(event_name = "turn.completed", intent = intent.as_label(), latency_ms, "turn handled");

        let reply = match notice {
            Some(notice) => format!("{notice}\n{reply}"),
            None => reply,
        };
        TurnResponse { reply, payload, intent: Some(intent), flow_state, retryable: false }
    }

    fn retry_later(&self, audit: &AuditContext, language: Language, error: &TurnError) -> TurnResponse {
        self.emit(
            AuditEvent::from_context(audit, "turn.failed", AuditCategory::Collaborator, AuditOutcome::Failed)
                .with_metadata("failure", error.failure_category()),
        );
        warn!(event_name = "turn.failed", failure = error.failure_category(), error = %error, "turn abandoned");
        TurnResponse::retryable(localize(MessageKey::RetryLater, language))
    }

    fn emit(&self, event: AuditEvent) {
        self.audit.emit(event);
    }
}
