use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::account::{AccountId, Payee};
use crate::domain::intent::Intent;
use crate::domain::language::Language;
use crate::errors::DomainError;
use crate::flows::{FlowType, PaymentState};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Slots a client may already know before the user speaks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtteranceContext {
    #[serde(default)]
    pub selected_account: Option<AccountId>,
    /// Set by clients whose UI is in "payments" mode, which makes bare pay/transfer verbs decisive.
    #[serde(default)]
    pub payment_mode: bool,
    #[serde(default)]
    pub payee_hint: Option<String>,
}

/// One user turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub language: Language,
    pub session_id: SessionId,
    #[serde(default)]
    pub context: UtteranceContext,
}

impl Utterance {
    pub fn new(text: impl Into<String>, language: Language, session_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language,
            session_id: SessionId(session_id.into()),
            context: UtteranceContext::default(),
        }
    }

    pub fn with_context(mut self, context: UtteranceContext) -> Self {
        self.context = context;
        self
    }
}

/// Slots owned by the guided payment flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentSlots {
    pub state: PaymentState,
    pub recipient: Option<Payee>,
    pub amount: Option<Decimal>,
    pub source_account: Option<AccountId>,
    /// Verification calls made over the whole flow.
    pub verification_attempts: u8,
    /// True once the verifier has been called for the current `AwaitingSecretCode` entry.
    pub verification_consumed: bool,
    /// A failed flow may return to confirmation while attempts remain.
    #[serde(default)]
    pub restartable: bool,
    pub reference_id: String,
    pub started_at: DateTime<Utc>,
}

impl PaymentSlots {
    pub fn new(reference_id: impl Into<String>, source_account: Option<AccountId>) -> Self {
        Self {
            state: PaymentState::CollectingRecipient,
            recipient: None,
            amount: None,
            source_account,
            verification_attempts: 0,
            verification_consumed: false,
            restartable: false,
            reference_id: reference_id.into(),
            started_at: Utc::now(),
        }
    }
}

/// Per-flow slot values; one variant per flow type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum ActiveFlow {
    Payment(PaymentSlots),
}

impl ActiveFlow {
    pub fn flow_type(&self) -> FlowType {
        match self {
            Self::Payment(_) => FlowType::Payment,
        }
    }

    /// Terminal and not waiting for a restart.
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Payment(slots) => {
                slots.state.is_terminal()
                    && !(slots.state == PaymentState::Failed && slots.restartable)
            }
        }
    }
}

/// Per-session accumulator, owned by the supervisor for the duration of a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: SessionId,
    pub current_intent: Option<Intent>,
    pub flow: Option<ActiveFlow>,
    pub turn: u64,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(session_id: SessionId) -> Self {
        Self { session_id, current_intent: None, flow: None, turn: 0, updated_at: Utc::now() }
    }

    pub fn has_active_flow(&self) -> bool {
        self.flow.is_some()
    }

    pub fn payment(&self) -> Option<&PaymentSlots> {
        match &self.flow {
            Some(ActiveFlow::Payment(slots)) => Some(slots),
            None => None,
        }
    }

    pub fn payment_state(&self) -> Option<PaymentState> {
        self.payment().map(|slots| slots.state)
    }

    pub fn reset_flow(&mut self) {
        self.flow = None;
    }

    pub fn is_inactive(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.flow.is_some() && now - self.updated_at > timeout
    }

    /// Checks that the stored flow is a combination the state machine defines.
    pub fn validate(&self) -> Result<(), DomainError> {
        let Some(ActiveFlow::Payment(slots)) = &self.flow else {
            return Ok(());
        };

        let invariant = |message: &str| {
            Err(DomainError::SessionStateCorruption(format!(
                "session {} in {:?}: {message}",
                self.session_id, slots.state
            )))
        };

        match slots.state {
            PaymentState::CollectingRecipient => Ok(()),
            PaymentState::CollectingAmount if slots.recipient.is_none() => {
                invariant("amount collection without a recipient")
            }
            PaymentState::AwaitingConfirmation | PaymentState::AwaitingSecretCode
                if slots.recipient.is_none() || slots.amount.is_none() =>
            {
                invariant("confirmation stage without recipient and amount")
            }
            PaymentState::AwaitingConfirmation if slots.verification_consumed => {
                invariant("confirmation stage with a consumed verification")
            }
            _ if slots.amount.is_some_and(|amount| amount <= Decimal::ZERO) => {
                invariant("non-positive amount")
            }
            _ => Ok(()),
        }
    }

    /// Advances bookkeeping after a successful turn. Terminal flows are dropped so the next
    /// turn starts clean.
    pub fn finish_turn(&mut self, intent: Intent) {
        self.turn = self.turn.saturating_add(1);
        self.current_intent = Some(intent);
        self.updated_at = Utc::now();
        if self.flow.as_ref().is_some_and(ActiveFlow::is_finished) {
            self.flow = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{ActiveFlow, ConversationState, PaymentSlots, SessionId};
    use crate::domain::account::Payee;
    use crate::domain::intent::Intent;
    use crate::errors::DomainError;
    use crate::flows::PaymentState;

    fn payee() -> Payee {
        Payee { payee_id: "p-1".to_string(), display_name: "Asha".to_string(), aliases: vec![] }
    }

    #[test]
    fn validate_rejects_states_outside_the_machine() {
        let mut state = ConversationState::new(SessionId("s-1".to_string()));
        let mut slots = PaymentSlots::new("TRF-1", None);
        slots.state = PaymentState::AwaitingSecretCode;
        state.flow = Some(ActiveFlow::Payment(slots));

        assert!(matches!(state.validate(), Err(DomainError::SessionStateCorruption(_))));
    }

    #[test]
    fn validate_accepts_consistent_flow() {
        let mut state = ConversationState::new(SessionId("s-1".to_string()));
        let mut slots = PaymentSlots::new("TRF-1", None);
        slots.state = PaymentState::AwaitingConfirmation;
        slots.recipient = Some(payee());
        slots.amount = Some(Decimal::new(500, 0));
        state.flow = Some(ActiveFlow::Payment(slots));

        assert!(state.validate().is_ok());
    }

    #[test]
    fn finish_turn_drops_terminal_flow_and_counts_turns() {
        let mut state = ConversationState::new(SessionId("s-2".to_string()));
        let mut slots = PaymentSlots::new("TRF-2", None);
        slots.state = PaymentState::Completed;
        state.flow = Some(ActiveFlow::Payment(slots));

        state.finish_turn(Intent::GuidedPayment);
        assert_eq!(state.turn, 1);
        assert!(state.flow.is_none());
        assert_eq!(state.current_intent, Some(Intent::GuidedPayment));
    }

    #[test]
    fn restartable_failure_survives_the_turn() {
        let mut state = ConversationState::new(SessionId("s-4".to_string()));
        let mut slots = PaymentSlots::new("TRF-4", None);
        slots.state = PaymentState::Failed;
        slots.recipient = Some(payee());
        slots.amount = Some(Decimal::new(10, 0));
        slots.restartable = true;
        state.flow = Some(ActiveFlow::Payment(slots));

        state.finish_turn(Intent::GuidedPayment);
        assert_eq!(state.payment_state(), Some(PaymentState::Failed));
    }

    #[test]
    fn inactivity_only_applies_to_active_flows() {
        let mut state = ConversationState::new(SessionId("s-3".to_string()));
        let later = Utc::now() + Duration::seconds(700);
        assert!(!state.is_inactive(later, Duration::seconds(600)));

        state.flow = Some(ActiveFlow::Payment(PaymentSlots::new("TRF-3", None)));
        assert!(state.is_inactive(later, Duration::seconds(600)));
    }
}
