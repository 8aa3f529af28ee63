//! Traits for storage abstraction and the notification boundary

use async_trait::async_trait;

use crate::loans::{Loan, LoanRepayment};
use crate::types::*;

/// Storage abstraction for the wallet ledger
///
/// This trait allows the engine to work with any backend (PostgreSQL,
/// MySQL, SQLite, in-memory, etc.) that supports row-level locking or
/// serializable transactions. Receivers are `&self`: the engine is shared
/// across concurrent tasks and implementations are expected to provide
/// their own interior synchronization.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create a new account; fails if the id is already taken
    async fn create_account(&self, account: &Account) -> LedgerResult<()>;

    /// Get an account by id
    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>>;

    /// Update an account's status and metadata.
    ///
    /// Balances are never written through this method; they move only
    /// through [`LedgerStore::post`].
    async fn update_account(&self, account: &Account) -> LedgerResult<()>;

    /// List accounts, optionally filtered by kind
    async fn list_accounts(&self, kind: Option<AccountKind>) -> LedgerResult<Vec<Account>>;

    /// Find the account of a given kind belonging to an owner
    async fn find_account_by_owner(
        &self,
        owner: &str,
        kind: AccountKind,
    ) -> LedgerResult<Option<Account>>;

    /// Atomically apply a zero-sum group of postings.
    ///
    /// Locks every referenced account in ascending account-id order,
    /// bounded by the store's lock timeout (`LedgerConflict` on expiry).
    /// Verifies each entry's account exists and is not closed, and that
    /// every resulting balance stays at or above the account's floor
    /// (`InsufficientFunds` otherwise). Either all postings and balance
    /// updates commit or none do; a concurrent balance read never observes
    /// a partial posting group.
    async fn post(
        &self,
        transaction_id: &str,
        entries: &[PostingEntry],
    ) -> LedgerResult<Vec<Posting>>;

    /// Balance consistent with the latest committed posting
    async fn get_balance(&self, account_id: &str) -> LedgerResult<i64>;

    /// Postings for an account ordered by timestamp ascending, bounded by
    /// the range; restartable by re-issuing with a narrower range
    async fn statement(
        &self,
        account_id: &str,
        range: StatementRange,
    ) -> LedgerResult<Vec<Posting>>;

    /// All postings committed under a transaction id, in application order
    async fn postings_for(&self, transaction_id: &str) -> LedgerResult<Vec<Posting>>;

    /// Persist a new transaction row and index its idempotency key
    async fn save_transaction(&self, transaction: &Transaction) -> LedgerResult<()>;

    /// Update an existing transaction row
    async fn update_transaction(&self, transaction: &Transaction) -> LedgerResult<()>;

    /// Get a transaction by id
    async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>>;

    /// Find the transaction previously recorded under an idempotency key
    async fn find_by_idempotency_key(&self, key: &str) -> LedgerResult<Option<Transaction>>;

    /// Release an idempotency key after a retryable failure, so the caller
    /// may re-execute under the same key; the failed row stays for audit
    async fn clear_idempotency_key(&self, key: &str) -> LedgerResult<()>;

    /// Persist a new loan row
    async fn save_loan(&self, loan: &Loan) -> LedgerResult<()>;

    /// Get a loan by id
    async fn get_loan(&self, loan_id: &str) -> LedgerResult<Option<Loan>>;

    /// Update an existing loan row
    async fn update_loan(&self, loan: &Loan) -> LedgerResult<()>;

    /// Loans held by a borrower account
    async fn loans_for_borrower(&self, borrower: &str) -> LedgerResult<Vec<Loan>>;

    /// Persist a loan repayment audit row
    async fn save_repayment(&self, repayment: &LoanRepayment) -> LedgerResult<()>;

    /// Repayments recorded against a loan, oldest first
    async fn repayments_for_loan(&self, loan_id: &str) -> LedgerResult<Vec<LoanRepayment>>;
}

/// Outbound notification boundary.
///
/// The engine emits one event per affected party at defined lifecycle
/// points; delivery (SMS, push, email) is entirely the collaborator's
/// concern.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Sink that drops every event; default when no collaborator is attached
pub struct NullNotificationSink;

impl NotificationSink for NullNotificationSink {
    fn notify(&self, _event: NotificationEvent) {}
}

/// Sink that retains events in memory, for tests and local inspection
#[derive(Default)]
pub struct CollectingNotificationSink {
    events: std::sync::Mutex<Vec<NotificationEvent>>,
}

impl CollectingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events emitted so far
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("sink poisoned").clone()
    }
}

impl NotificationSink for CollectingNotificationSink {
    fn notify(&self, event: NotificationEvent) {
        self.events.lock().expect("sink poisoned").push(event);
    }
}
