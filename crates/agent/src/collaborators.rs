use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tellr_core::domain::{
    AccountBalance, AccountId, Payee, SessionId, Transaction, TransferConfirmation,
    TransferRequest,
};
use tellr_core::errors::CollaboratorError;

/// Read-only account queries plus the single money-moving call. The assistant never computes
/// or mutates balances itself.
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn balances(&self, session_id: &SessionId)
        -> Result<Vec<AccountBalance>, CollaboratorError>;

    async fn transactions(
        &self,
        session_id: &SessionId,
        account_id: &AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, CollaboratorError>;

    async fn payees(&self, session_id: &SessionId) -> Result<Vec<Payee>, CollaboratorError>;

    /// Not idempotent from the caller's side; never retried automatically.
    async fn execute_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<TransferConfirmation, CollaboratorError>;
}

/// Checks a secret code. Only pass/fail comes back; the secret is never stored.
#[async_trait]
pub trait SecretVerifier: Send + Sync {
    async fn verify(
        &self,
        secret: &SecretString,
        session_id: &SessionId,
    ) -> Result<bool, CollaboratorError>;
}

/// Ledger backed by fixed data, for local runs and tests.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    balances: Vec<AccountBalance>,
    transactions: HashMap<AccountId, Vec<Transaction>>,
    payees: Vec<Payee>,
    fail_transfers: bool,
    executed: Arc<Mutex<Vec<TransferRequest>>>,
}

impl InMemoryLedger {
    pub fn new(balances: Vec<AccountBalance>, payees: Vec<Payee>) -> Self {
        Self { balances, payees, ..Self::default() }
    }

    pub fn with_transactions(mut self, account_id: AccountId, transactions: Vec<Transaction>) -> Self {
        self.transactions.insert(account_id, transactions);
        self
    }

    pub fn failing_transfers(mut self) -> Self {
        self.fail_transfers = true;
        self
    }

    pub fn executed_transfers(&self) -> Vec<TransferRequest> {
        match self.executed.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LedgerService for InMemoryLedger {
    async fn balances(
        &self,
        _session_id: &SessionId,
    ) -> Result<Vec<AccountBalance>, CollaboratorError> {
        Ok(self.balances.clone())
    }

    async fn transactions(
        &self,
        _session_id: &SessionId,
        account_id: &AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, CollaboratorError> {
        let mut transactions = self.transactions.get(account_id).cloned().unwrap_or_default();
        transactions.sort_by(|left, right| right.booked_at.cmp(&left.booked_at));
        transactions.truncate(limit);
        Ok(transactions)
    }

    async fn payees(&self, _session_id: &SessionId) -> Result<Vec<Payee>, CollaboratorError> {
        Ok(self.payees.clone())
    }

    async fn execute_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<TransferConfirmation, CollaboratorError> {
        if self.fail_transfers {
            return Err(CollaboratorError::Unavailable {
                collaborator: "ledger",
                message: "transfer rail offline".to_string(),
            });
        }
        let reference_id = request.reference_id.clone();
        match self.executed.lock() {
            Ok(mut guard) => guard.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }
        Ok(TransferConfirmation { reference_id, accepted_at: Utc::now() })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use tellr_core::domain::{AccountId, SessionId, Transaction, TransactionDirection};

    use super::{InMemoryLedger, LedgerService};

    fn transaction(id: &str, days_ago: i64) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            account_id: AccountId("ACC-1".to_string()),
            direction: TransactionDirection::Debit,
            amount: Decimal::new(100, 0),
            currency: "INR".to_string(),
            description: "groceries".to_string(),
            booked_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[tokio::test]
    async fn transactions_come_back_newest_first_and_limited() {
        let ledger = InMemoryLedger::default().with_transactions(
            AccountId("ACC-1".to_string()),
            vec![transaction("t-old", 9), transaction("t-new", 1), transaction("t-mid", 4)],
        );
        let session = SessionId("s-1".to_string());
        let listed = ledger
            .transactions(&session, &AccountId("ACC-1".to_string()), 2)
            .await
            .expect("transactions");
        let ids: Vec<_> = listed.iter().map(|item| item.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["t-new", "t-mid"]);
    }
}
