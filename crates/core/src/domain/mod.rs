pub mod account;
pub mod conversation;
pub mod guardrail;
pub mod intent;
pub mod language;
pub mod passage;
pub mod payload;

pub use account::{
    AccountBalance, AccountId, Payee, Transaction, TransactionDirection, TransferConfirmation,
    TransferRequest,
};
pub use conversation::{ActiveFlow, ConversationState, PaymentSlots, SessionId, Utterance, UtteranceContext};
pub use guardrail::{GuardrailVerdict, ViolationCategory};
pub use intent::Intent;
pub use language::{detect_language, script_share, Language, Script};
pub use passage::{Category, CategoryGroup, Passage, PassageId, RetrievalResult, ScoredPassage};
pub use payload::{KnowledgeSource, SelectionOption, SidePayload, TurnResponse};
