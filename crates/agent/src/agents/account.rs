use std::sync::Arc;

use async_trait::async_trait;
use tellr_core::domain::{
    AccountBalance, AccountId, ConversationState, Language, SelectionOption, SidePayload,
    Transaction, TransactionDirection,
};
use tellr_core::errors::TurnError;
use tellr_core::messages::{localize, render, MessageKey};

use crate::agents::{AgentOutcome, CapabilityAgent, TurnContext};
use crate::collaborators::LedgerService;
use crate::retry::{with_retries, RetryPolicy};
use crate::slots::{contains_phrase, normalize_text};

const RECENT_TRANSACTIONS: usize = 5;

const TRANSACTION_PHRASES: &[&str] = &[
    "transaction",
    "transactions",
    "statement",
    "history",
    "spent",
    "last payments",
    "लेनदेन",
    "स्टेटमेंट",
    "विवरण",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AccountQuery {
    Balances,
    Transactions,
}

fn query_kind(text: &str) -> AccountQuery {
    let normalized = normalize_text(text);
    if TRANSACTION_PHRASES.iter().any(|phrase| contains_phrase(&normalized, phrase)) {
        AccountQuery::Transactions
    } else {
        AccountQuery::Balances
    }
}

/// Read-only balance and transaction lookups. Figures come from the ledger verbatim.
pub struct AccountAgent {
    ledger: Arc<dyn LedgerService>,
    retry: RetryPolicy,
}

impl AccountAgent {
    pub fn new(ledger: Arc<dyn LedgerService>, retry: RetryPolicy) -> Self {
        Self { ledger, retry }
    }

    async fn balances(&self, context: &TurnContext<'_>) -> Result<Vec<AccountBalance>, TurnError> {
        let session_id = &context.utterance.session_id;
        Ok(with_retries(self.retry, "ledger.balances", || self.ledger.balances(session_id)).await?)
    }

    async fn show_balances(
        &self,
        context: &TurnContext<'_>,
        state: ConversationState,
    ) -> Result<AgentOutcome, TurnError> {
        let language = context.utterance.language;
        let balances = self.balances(context).await?;
        if balances.is_empty() {
            return Ok(AgentOutcome::reply(localize(MessageKey::NoAccounts, language), state));
        }

        let reply = balances.iter().map(|balance| balance_line(balance, language)).collect::<Vec<_>>();
        Ok(AgentOutcome::reply(reply.join("\n"), state)
            .with_payload(SidePayload::BalanceList { balances }))
    }

    async fn show_transactions(
        &self,
        context: &TurnContext<'_>,
        state: ConversationState,
    ) -> Result<AgentOutcome, TurnError> {
        let language = context.utterance.language;
        let account = match &context.utterance.context.selected_account {
            Some(account) => account.clone(),
            None => {
                let balances = self.balances(context).await?;
                match balances.as_slice() {
                    [] => {
                        return Ok(AgentOutcome::reply(localize(MessageKey::NoAccounts, language), state))
                    }
                    [only] => only.account_id.clone(),
                    several => return Ok(select_account(several, language, state)),
                }
            }
        };

        let session_id = &context.utterance.session_id;
        let transactions = with_retries(self.retry, "ledger.transactions", || {
            self.ledger.transactions(session_id, &account, RECENT_TRANSACTIONS)
        })
        .await?;
        if transactions.is_empty() {
            return Ok(AgentOutcome::reply(localize(MessageKey::NoTransactions, language), state));
        }

        let reply = transactions
            .iter()
            .map(|transaction| transaction_line(transaction, language))
            .collect::<Vec<_>>();
        Ok(AgentOutcome::reply(reply.join("\n"), state)
            .with_payload(SidePayload::TransactionList { transactions }))
    }
}

#[async_trait]
impl CapabilityAgent for AccountAgent {
    fn name(&self) -> &'static str {
        "account"
    }

    async fn handle(
        &self,
        context: &TurnContext<'_>,
        state: ConversationState,
    ) -> Result<AgentOutcome, TurnError> {
        match query_kind(&context.utterance.text) {
            AccountQuery::Balances => self.show_balances(context, state).await,
            AccountQuery::Transactions => self.show_transactions(context, state).await,
        }
    }
}

fn select_account(balances: &[AccountBalance], language: Language, state: ConversationState) -> AgentOutcome {
    let prompt = localize(MessageKey::SelectAccount, language);
    let options = balances
        .iter()
        .map(|balance| SelectionOption {
            id: balance.account_id.0.clone(),
            label: account_label(&balance.account_type, &balance.account_id),
        })
        .collect();
    AgentOutcome::reply(prompt, state)
        .with_payload(SidePayload::SelectionList { prompt: prompt.to_string(), options })
}

fn account_label(account_type: &str, account_id: &AccountId) -> String {
    format!("{account_type} {}", account_id.masked())
}

fn balance_line(balance: &AccountBalance, language: Language) -> String {
    let account = balance.account_id.masked();
    let amount = format!("{:.2}", balance.available);
    render(
        MessageKey::BalanceLine,
        language,
        &[
            ("account_type", balance.account_type.as_str()),
            ("account", account.as_str()),
            ("currency", balance.currency.as_str()),
            ("amount", amount.as_str()),
        ],
    )
}

fn transaction_line(transaction: &Transaction, language: Language) -> String {
    let date = transaction.booked_at.format("%d %b %Y").to_string();
    let amount = format!("{:.2}", transaction.amount);
    render(
        MessageKey::TransactionLine,
        language,
        &[
            ("date", date.as_str()),
            ("direction", direction_label(transaction.direction, language)),
            ("currency", transaction.currency.as_str()),
            ("amount", amount.as_str()),
            ("description", transaction.description.as_str()),
        ],
    )
}

fn direction_label(direction: TransactionDirection, language: Language) -> &'static str {
    match (direction, language) {
        (TransactionDirection::Credit, Language::English) => "Credit",
        (TransactionDirection::Debit, Language::English) => "Debit",
        (TransactionDirection::Credit, Language::Hindi) => "जमा",
        (TransactionDirection::Debit, Language::Hindi) => "नामे",
    }
}
