use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tellr_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use tellr_core::config::FlowConfig;
use tellr_core::domain::{
    ActiveFlow, ConversationState, Language, Payee, PaymentSlots, SidePayload, TransferRequest,
};
use tellr_core::errors::{DomainError, TurnError};
use tellr_core::flows::{FlowContext, FlowEngine, PaymentEvent, PaymentFlow, PaymentState};
use tellr_core::messages::{localize, render, MessageKey};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{AgentOutcome, CapabilityAgent, TurnContext};
use crate::collaborators::{LedgerService, SecretVerifier};
use crate::retry::{with_retries, RetryPolicy};
use crate::slots::{
    is_affirmative, is_negative, is_retry_request, match_payee, parse_amount,
    secret_code_candidate,
};

pub const DEFAULT_CURRENCY: &str = "INR";

/// Reference ids look like `TRF-3F9A1C2B7D4E`.
pub fn new_reference_id() -> String {
    let hex: String = Uuid::new_v4().simple().to_string().chars().take(12).collect();
    format!("TRF-{}", hex.to_uppercase())
}

struct Reply {
    text: String,
    payload: Option<SidePayload>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), payload: None }
    }

    fn message(key: MessageKey, language: Language) -> Self {
        Self::text(localize(key, language))
    }
}

/// Guided payment dialogue. Slot filling reads the utterance; every state change goes through
/// the payment state machine. The verifier is called at most once per entry into
/// `AwaitingSecretCode` and the transfer at most once per flow.
pub struct PaymentAgent {
    ledger: Arc<dyn LedgerService>,
    verifier: Arc<dyn SecretVerifier>,
    engine: FlowEngine<PaymentFlow>,
    max_verification_attempts: u8,
    retry: RetryPolicy,
}

impl PaymentAgent {
    pub fn new(
        ledger: Arc<dyn LedgerService>,
        verifier: Arc<dyn SecretVerifier>,
        flow: &FlowConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            verifier,
            engine: FlowEngine::default(),
            max_verification_attempts: flow.max_verification_attempts,
            retry,
        }
    }

    fn advance(
        &self,
        context: &TurnContext<'_>,
        slots: &mut PaymentSlots,
        event: PaymentEvent,
    ) -> Result<(), TurnError> {
        let mut flow_context =
            FlowContext::with_attempts(slots.verification_attempts, self.max_verification_attempts);
        if slots.recipient.is_none() {
            flow_context.missing_slots.push("recipient".to_string());
        }
        if slots.amount.is_none() {
            flow_context.missing_slots.push("amount".to_string());
        }

        let outcome = self
            .engine
            .apply_with_audit(&slots.state, &event, &flow_context, context.audit_sink, context.audit)
            .map_err(|error| TurnError::from(DomainError::from(error)))?;
        slots.state = outcome.to;
        Ok(())
    }

    fn attempts_remaining(&self, slots: &PaymentSlots) -> bool {
        slots.verification_attempts < self.max_verification_attempts
    }

    async fn payees(&self, context: &TurnContext<'_>) -> Result<Vec<Payee>, TurnError> {
        let session_id = &context.utterance.session_id;
        Ok(with_retries(self.retry, "ledger.payees", || self.ledger.payees(session_id)).await?)
    }

    /// Recipient and amount collection. Both may arrive in one utterance.
    async fn collect(
        &self,
        context: &TurnContext<'_>,
        slots: &mut PaymentSlots,
        fresh: bool,
    ) -> Result<Reply, TurnError> {
        let utterance = context.utterance;
        let language = utterance.language;
        let mut prompted_amount = false;

        if slots.state == PaymentState::CollectingRecipient {
            let payees = self.payees(context).await?;
            let matched = match_payee(&utterance.text, &payees).or_else(|| {
                utterance.context.payee_hint.as_deref().and_then(|hint| match_payee(hint, &payees))
            });
            let Some(payee) = matched else {
                let key = if fresh { MessageKey::PromptRecipient } else { MessageKey::RecipientNotFound };
                return Ok(Reply::message(key, language));
            };
            slots.recipient = Some(payee.clone());
            self.advance(context, slots, PaymentEvent::RecipientProvided)?;
            prompted_amount = true;
        }

        if slots.state == PaymentState::CollectingAmount {
            let Some(amount) = parse_amount(&utterance.text) else {
                if prompted_amount {
                    return Ok(Reply::text(render(
                        MessageKey::PromptAmount,
                        language,
                        &[("recipient", recipient_name(slots))],
                    )));
                }
                return Ok(Reply::message(MessageKey::InvalidAmount, language));
            };
            slots.amount = Some(amount);
            self.advance(context, slots, PaymentEvent::AmountProvided)?;
        }

        Ok(confirmation_prompt(slots, language))
    }

    fn confirm(
        &self,
        context: &TurnContext<'_>,
        slots: &mut PaymentSlots,
    ) -> Result<Reply, TurnError> {
        let language = context.utterance.language;
        let text = &context.utterance.text;

        if is_negative(text) {
            self.advance(context, slots, PaymentEvent::Declined)?;
            return Ok(Reply::message(MessageKey::FlowCancelled, language));
        }
        if !is_affirmative(text) {
            return Ok(Reply::message(MessageKey::ConfirmationReprompt, language));
        }

        self.advance(context, slots, PaymentEvent::Confirmed)?;
        slots.verification_consumed = false;
        Ok(secret_code_request(MessageKey::RequestSecretCode, slots, language))
    }

    async fn verify(
        &self,
        context: &TurnContext<'_>,
        state: &ConversationState,
        slots: &mut PaymentSlots,
    ) -> Result<Reply, TurnError> {
        let language = context.utterance.language;

        if slots.verification_consumed {
            // A previous turn called the verifier but never recorded the answer.
            if !is_retry_request(&context.utterance.text) {
                return Ok(Reply::message(MessageKey::VerificationPending, language));
            }
            self.advance(context, slots, PaymentEvent::VerificationError)?;
            return self.restart(context, slots);
        }

        let typed = secret_code_candidate(&context.utterance.text);
        let Some(secret) = context.secret.or(typed.as_ref()) else {
            return Ok(secret_code_request(MessageKey::SecretCodeReprompt, slots, language));
        };

        slots.verification_consumed = true;
        slots.verification_attempts = slots.verification_attempts.saturating_add(1);
        checkpoint(context, state, slots).await?;

        match self.verifier.verify(secret, &context.utterance.session_id).await {
            Ok(true) => {
                self.advance(context, slots, PaymentEvent::SecretVerified)?;
                self.execute(context, state, slots).await
            }
            Ok(false) => {
                self.advance(context, slots, PaymentEvent::SecretRejected)?;
                slots.restartable = self.attempts_remaining(slots);
                emit(context, "payment.verification_rejected", AuditOutcome::Rejected, slots);
                let key = if slots.restartable {
                    MessageKey::VerificationFailedRetry
                } else {
                    MessageKey::VerificationFailedFinal
                };
                Ok(Reply::message(key, language))
            }
            Err(error) => {
                warn!(
                    event_name = "payment.verification_unavailable",
                    session_id = %context.utterance.session_id,
                    error = %error,
                    "secret verification failed"
                );
                self.advance(context, slots, PaymentEvent::VerificationError)?;
                slots.restartable = false;
                emit(context, "payment.verification_unavailable", AuditOutcome::Failed, slots);
                Ok(Reply::message(MessageKey::VerificationUnavailable, language))
            }
        }
    }

    async fn execute(
        &self,
        context: &TurnContext<'_>,
        state: &ConversationState,
        slots: &mut PaymentSlots,
    ) -> Result<Reply, TurnError> {
        let language = context.utterance.language;
        let (Some(recipient), Some(amount)) = (slots.recipient.clone(), slots.amount) else {
            return Err(TurnError::SessionStateCorruption(format!(
                "session {} reached transfer without recipient and amount",
                context.utterance.session_id
            )));
        };
        checkpoint(context, state, slots).await?;

        let request = TransferRequest {
            session_id: context.utterance.session_id.0.clone(),
            source_account: slots.source_account.clone(),
            payee_id: recipient.payee_id.clone(),
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            reference_id: slots.reference_id.clone(),
        };

        match self.ledger.execute_transfer(request).await {
            Ok(confirmation) => {
                emit(context, "payment.transfer_executed", AuditOutcome::Success, slots);
                info!(
                    event_name = "payment.transfer_executed",
                    session_id = %context.utterance.session_id,
                    reference_id = %confirmation.reference_id,
                    "transfer accepted by ledger"
                );
                let amount_text = format_amount(amount);
                let text = render(
                    MessageKey::TransferCompleted,
                    language,
                    &[
                        ("currency", DEFAULT_CURRENCY),
                        ("amount", amount_text.as_str()),
                        ("recipient", recipient.display_name.as_str()),
                        ("reference", confirmation.reference_id.as_str()),
                    ],
                );
                Ok(Reply {
                    text,
                    payload: Some(SidePayload::TransferReceipt {
                        recipient: recipient.display_name,
                        amount,
                        currency: DEFAULT_CURRENCY.to_string(),
                        reference_id: confirmation.reference_id,
                    }),
                })
            }
            Err(error) => {
                warn!(
                    event_name = "payment.transfer_failed",
                    session_id = %context.utterance.session_id,
                    error = %error,
                    "ledger rejected transfer"
                );
                self.advance(context, slots, PaymentEvent::TransferFailed)?;
                slots.restartable = false;
                emit(context, "payment.transfer_failed", AuditOutcome::Failed, slots);
                Ok(Reply::message(MessageKey::TransferFailed, language))
            }
        }
    }

    fn restart(&self, context: &TurnContext<'_>, slots: &mut PaymentSlots) -> Result<Reply, TurnError> {
        let language = context.utterance.language;
        if !self.attempts_remaining(slots) {
            slots.restartable = false;
            return Ok(Reply::message(MessageKey::VerificationFailedFinal, language));
        }
        self.advance(context, slots, PaymentEvent::RestartConfirmation)?;
        slots.verification_consumed = false;
        slots.restartable = false;
        Ok(confirmation_prompt(slots, language))
    }

    fn resume_failed(
        &self,
        context: &TurnContext<'_>,
        slots: &mut PaymentSlots,
    ) -> Result<Reply, TurnError> {
        let language = context.utterance.language;
        let text = &context.utterance.text;
        if is_negative(text) {
            self.advance(context, slots, PaymentEvent::CancelRequested)?;
            slots.restartable = false;
            return Ok(Reply::message(MessageKey::FlowCancelled, language));
        }
        if is_retry_request(text) {
            return self.restart(context, slots);
        }
        Ok(Reply::message(MessageKey::VerificationFailedRetry, language))
    }
}

#[async_trait]
impl CapabilityAgent for PaymentAgent {
    fn name(&self) -> &'static str {
        "payment"
    }

    async fn handle(
        &self,
        context: &TurnContext<'_>,
        mut state: ConversationState,
    ) -> Result<AgentOutcome, TurnError> {
        let existing = state
            .flow
            .take()
            .filter(|flow| !flow.is_finished())
            .map(|ActiveFlow::Payment(slots)| slots);
        let fresh = existing.is_none();
        let mut slots = existing.unwrap_or_else(|| {
            PaymentSlots::new(new_reference_id(), context.utterance.context.selected_account.clone())
        });
        if fresh {
            emit(context, "payment.flow_started", AuditOutcome::Success, &slots);
        }

        let reply = match slots.state {
            PaymentState::CollectingRecipient | PaymentState::CollectingAmount => {
                self.collect(context, &mut slots, fresh).await?
            }
            PaymentState::AwaitingConfirmation => self.confirm(context, &mut slots)?,
            PaymentState::AwaitingSecretCode => self.verify(context, &state, &mut slots).await?,
            PaymentState::Failed => self.resume_failed(context, &mut slots)?,
            PaymentState::Completed | PaymentState::Cancelled => {
                return Err(TurnError::SessionStateCorruption(format!(
                    "session {} resumed a finished payment flow",
                    context.utterance.session_id
                )));
            }
        };

        state.flow = Some(ActiveFlow::Payment(slots));
        let outcome = AgentOutcome::reply(reply.text, state);
        Ok(match reply.payload {
            Some(payload) => outcome.with_payload(payload),
            None => outcome,
        })
    }
}

/// Persists the flow before an irreversible call, so a turn that dies mid-call can never
/// repeat it.
async fn checkpoint(
    context: &TurnContext<'_>,
    state: &ConversationState,
    slots: &PaymentSlots,
) -> Result<(), TurnError> {
    let mut snapshot = state.clone();
    snapshot.flow = Some(ActiveFlow::Payment(slots.clone()));
    context.store.save(&snapshot).await?;
    Ok(())
}

fn emit(context: &TurnContext<'_>, event_type: &str, outcome: AuditOutcome, slots: &PaymentSlots) {
    let mut event = AuditEvent::from_context(context.audit, event_type, AuditCategory::Flow, outcome)
        .with_metadata("reference_id", slots.reference_id.as_str())
        .with_metadata("state", slots.state.as_str())
        .with_metadata("verification_attempts", slots.verification_attempts.to_string());
    if let Some(recipient) = &slots.recipient {
        event = event.with_metadata("payee_id", recipient.payee_id.as_str());
    }
    context.audit_sink.emit(event);
}

fn recipient_name(slots: &PaymentSlots) -> &str {
    slots.recipient.as_ref().map(|payee| payee.display_name.as_str()).unwrap_or_default()
}

fn format_amount(amount: Decimal) -> String {
    format!("{amount:.2}")
}

fn confirmation_prompt(slots: &PaymentSlots, language: Language) -> Reply {
    let amount = slots.amount.map(format_amount).unwrap_or_default();
    Reply::text(render(
        MessageKey::PromptConfirmation,
        language,
        &[
            ("currency", DEFAULT_CURRENCY),
            ("amount", amount.as_str()),
            ("recipient", recipient_name(slots)),
        ],
    ))
}

fn secret_code_request(key: MessageKey, slots: &PaymentSlots, language: Language) -> Reply {
    Reply {
        text: localize(key, language).to_string(),
        payload: Some(SidePayload::CollectSecretCode { reference: slots.reference_id.clone() }),
    }
}
