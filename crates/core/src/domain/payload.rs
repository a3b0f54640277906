use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::account::{AccountBalance, Transaction};
use crate::domain::intent::Intent;
use crate::domain::passage::Category;
use crate::flows::PaymentState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOption {
    pub id: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub passage_id: String,
    pub section: String,
}

/// Machine-readable UI hint returned next to the reply text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidePayload {
    BalanceList { balances: Vec<AccountBalance> },
    TransactionList { transactions: Vec<Transaction> },
    KnowledgeCard { title: String, category: Category, sources: Vec<KnowledgeSource> },
    SelectionList { prompt: String, options: Vec<SelectionOption> },
    /// The client should collect the secret code through its secure input, not the chat box.
    CollectSecretCode { reference: String },
    TransferReceipt { recipient: String, amount: Decimal, currency: String, reference_id: String },
}

impl SidePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BalanceList { .. } => "balance_list",
            Self::TransactionList { .. } => "transaction_list",
            Self::KnowledgeCard { .. } => "knowledge_card",
            Self::SelectionList { .. } => "selection_list",
            Self::CollectSecretCode { .. } => "collect_secret_code",
            Self::TransferReceipt { .. } => "transfer_receipt",
        }
    }

    /// Free-text fields a person reads. Identifiers the client echoes back (account ids,
    /// option ids, references) are not included.
    pub fn display_text_mut(&mut self) -> Vec<&mut String> {
        match self {
            Self::BalanceList { balances } => {
                balances.iter_mut().map(|balance| &mut balance.account_type).collect()
            }
            Self::TransactionList { transactions } => {
                transactions.iter_mut().map(|transaction| &mut transaction.description).collect()
            }
            Self::KnowledgeCard { title, sources, .. } => std::iter::once(title)
                .chain(sources.iter_mut().map(|source| &mut source.section))
                .collect(),
            Self::SelectionList { prompt, options } => std::iter::once(prompt)
                .chain(options.iter_mut().map(|option| &mut option.label))
                .collect(),
            Self::CollectSecretCode { .. } => Vec::new(),
            Self::TransferReceipt { recipient, .. } => vec![recipient],
        }
    }

    /// Reference the flow issued for this payload, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::CollectSecretCode { reference } => Some(reference),
            Self::TransferReceipt { reference_id, .. } => Some(reference_id),
            _ => None,
        }
    }
}

/// What the core hands back for one utterance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<SidePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_state: Option<PaymentState>,
    pub retryable: bool,
}

impl TurnResponse {
    pub fn text(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), payload: None, intent: None, flow_state: None, retryable: false }
    }

    pub fn retryable(reply: impl Into<String>) -> Self {
        Self { retryable: true, ..Self::text(reply) }
    }
}
