use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Payment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    CollectingRecipient,
    CollectingAmount,
    AwaitingConfirmation,
    AwaitingSecretCode,
    Completed,
    Cancelled,
    Failed,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectingRecipient => "collecting_recipient",
            Self::CollectingAmount => "collecting_amount",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::AwaitingSecretCode => "awaiting_secret_code",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEvent {
    RecipientProvided,
    AmountProvided,
    Confirmed,
    Declined,
    SecretVerified,
    SecretRejected,
    VerificationError,
    TransferFailed,
    RestartConfirmation,
    CancelRequested,
    TimedOut,
}

/// Facts about the slots the transition function needs; the engine never reads free text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_slots: Vec<String>,
    pub verification_attempts: u8,
    pub max_verification_attempts: u8,
}

impl FlowContext {
    pub fn with_attempts(verification_attempts: u8, max_verification_attempts: u8) -> Self {
        Self { missing_slots: Vec::new(), verification_attempts, max_verification_attempts }
    }

    pub fn attempts_remaining(&self) -> bool {
        self.verification_attempts < self.max_verification_attempts
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    PromptAmount,
    PromptConfirmation,
    RequestSecretCode,
    ExecuteTransfer,
    IssueReceipt,
    ReportFailure,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PaymentState,
    pub to: PaymentState,
    pub event: PaymentEvent,
    pub actions: Vec<FlowAction>,
}
