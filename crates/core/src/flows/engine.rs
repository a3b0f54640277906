use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    FlowAction, FlowContext, FlowType, PaymentEvent, PaymentState, TransitionOutcome,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> PaymentState;
    fn transition(
        &self,
        current: &PaymentState,
        event: &PaymentEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct PaymentFlow;

impl FlowDefinition for PaymentFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::Payment
    }

    fn initial_state(&self) -> PaymentState {
        PaymentState::CollectingRecipient
    }

    fn transition(
        &self,
        current: &PaymentState,
        event: &PaymentEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_payment(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> PaymentState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &PaymentState,
        event: &PaymentEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &PaymentState,
        event: &PaymentEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.session_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", format!("{:?}", self.flow_type()))
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.session_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<PaymentFlow> {
    fn default() -> Self {
        Self::new(PaymentFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required slots before transition from {state:?}: {missing_slots:?}")]
    MissingRequiredSlots { state: PaymentState, missing_slots: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PaymentState, event: PaymentEvent },
    #[error("verification attempts exhausted ({attempts} used)")]
    AttemptsExhausted { attempts: u8 },
}

fn transition_payment(
    current: &PaymentState,
    event: &PaymentEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ExecuteTransfer, IssueReceipt, PromptAmount, PromptConfirmation, ReportFailure,
        RequestSecretCode,
    };
    use PaymentEvent::{
        AmountProvided, CancelRequested, Confirmed, Declined, RecipientProvided,
        RestartConfirmation, SecretRejected, SecretVerified, TimedOut, TransferFailed,
        VerificationError,
    };
    use PaymentState::{
        AwaitingConfirmation, AwaitingSecretCode, Cancelled, CollectingAmount,
        CollectingRecipient, Completed, Failed,
    };

    let require_slots = || {
        if context.missing_slots.is_empty() {
            Ok(())
        } else {
            Err(FlowTransitionError::MissingRequiredSlots {
                state: *current,
                missing_slots: context.missing_slots.clone(),
            })
        }
    };

    let (to, actions) = match (current, event) {
        (CollectingRecipient, RecipientProvided) => (CollectingAmount, vec![PromptAmount]),
        (CollectingAmount, AmountProvided) => {
            require_slots()?;
            (AwaitingConfirmation, vec![PromptConfirmation])
        }
        (AwaitingConfirmation, Confirmed) => {
            require_slots()?;
            if !context.attempts_remaining() {
                return Err(FlowTransitionError::AttemptsExhausted {
                    attempts: context.verification_attempts,
                });
            }
            (AwaitingSecretCode, vec![RequestSecretCode])
        }
        (AwaitingConfirmation, Declined) => (Cancelled, Vec::new()),
        (AwaitingSecretCode, SecretVerified) => (Completed, vec![ExecuteTransfer, IssueReceipt]),
        (AwaitingSecretCode, SecretRejected) | (AwaitingSecretCode, VerificationError) => {
            (Failed, vec![ReportFailure])
        }
        (Completed, TransferFailed) => (Failed, vec![ReportFailure]),
        (Failed, RestartConfirmation) => {
            if !context.attempts_remaining() {
                return Err(FlowTransitionError::AttemptsExhausted {
                    attempts: context.verification_attempts,
                });
            }
            (AwaitingConfirmation, vec![PromptConfirmation])
        }
        (state, CancelRequested) | (state, TimedOut) if !state.is_terminal() => {
            (Cancelled, Vec::new())
        }
        (Failed, CancelRequested) | (Failed, TimedOut) => (Cancelled, Vec::new()),
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}
