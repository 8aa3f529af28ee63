//! In-memory store implementation for testing and development

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::loans::{Loan, LoanRepayment};
use crate::traits::LedgerStore;
use crate::types::*;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory [`LedgerStore`] backed by `Arc<RwLock<HashMap>>` tables.
///
/// Postings are applied under per-account async mutexes acquired in
/// ascending account-id order, so concurrent opposing transfers cannot
/// deadlock; an acquisition that cannot complete within the lock timeout
/// fails with `LedgerConflict` instead of blocking indefinitely.
#[derive(Clone)]
pub struct MemoryStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    postings: Arc<RwLock<Vec<Posting>>>,
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
    idempotency: Arc<RwLock<HashMap<String, String>>>,
    loans: Arc<RwLock<HashMap<String, Loan>>>,
    repayments: Arc<RwLock<Vec<LoanRepayment>>>,
    account_locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
    lock_timeout: Duration,
}

impl MemoryStore {
    /// Create a new memory store with the default lock timeout
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            postings: Arc::new(RwLock::new(Vec::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            idempotency: Arc::new(RwLock::new(HashMap::new())),
            loans: Arc::new(RwLock::new(HashMap::new())),
            repayments: Arc::new(RwLock::new(Vec::new())),
            account_locks: Arc::new(RwLock::new(HashMap::new())),
            lock_timeout,
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.accounts.write().unwrap().clear();
        self.postings.write().unwrap().clear();
        self.transactions.write().unwrap().clear();
        self.idempotency.write().unwrap().clear();
        self.loans.write().unwrap().clear();
        self.repayments.write().unwrap().clear();
    }

    fn lock_for(&self, account_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.account_locks.read().unwrap().get(account_id) {
            return lock.clone();
        }
        self.account_locks
            .write()
            .unwrap()
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire every referenced account's lock in ascending id order,
    /// bounded by the lock timeout
    async fn acquire_locks(
        &self,
        account_ids: &BTreeSet<String>,
    ) -> LedgerResult<Vec<OwnedMutexGuard<()>>> {
        let mut guards = Vec::with_capacity(account_ids.len());
        for account_id in account_ids {
            let lock = self.lock_for(account_id);
            match tokio::time::timeout(self.lock_timeout, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    return Err(LedgerError::LedgerConflict(format!(
                        "timed out locking account '{}'",
                        account_id
                    )));
                }
            }
        }
        Ok(guards)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_account(&self, account: &Account) -> LedgerResult<()> {
        let mut accounts = self.accounts.write().unwrap();
        if accounts.contains_key(&account.id) {
            return Err(LedgerError::Storage(format!(
                "account '{}' already exists",
                account.id
            )));
        }
        accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self.accounts.read().unwrap().get(account_id).cloned())
    }

    async fn update_account(&self, account: &Account) -> LedgerResult<()> {
        let mut accounts = self.accounts.write().unwrap();
        match accounts.get_mut(&account.id) {
            Some(existing) => {
                // Balances move only through post(); keep the committed one
                let balance = existing.balance;
                let version = existing.version;
                *existing = account.clone();
                existing.balance = balance;
                existing.version = version + 1;
                Ok(())
            }
            None => Err(LedgerError::AccountNotFound(account.id.clone())),
        }
    }

    async fn list_accounts(&self, kind: Option<AccountKind>) -> LedgerResult<Vec<Account>> {
        let accounts = self.accounts.read().unwrap();
        Ok(accounts
            .values()
            .filter(|account| kind.is_none_or(|k| account.kind == k))
            .cloned()
            .collect())
    }

    async fn find_account_by_owner(
        &self,
        owner: &str,
        kind: AccountKind,
    ) -> LedgerResult<Option<Account>> {
        let accounts = self.accounts.read().unwrap();
        Ok(accounts
            .values()
            .find(|account| account.owner == owner && account.kind == kind)
            .cloned())
    }

    async fn post(
        &self,
        transaction_id: &str,
        entries: &[PostingEntry],
    ) -> LedgerResult<Vec<Posting>> {
        if entries.is_empty() {
            return Err(LedgerError::Validation(
                "posting set must not be empty".to_string(),
            ));
        }
        let net: i64 = entries.iter().map(|e| e.amount).sum();
        if net != 0 {
            return Err(LedgerError::UnbalancedPostings {
                transaction_id: transaction_id.to_string(),
                net,
            });
        }

        let account_ids: BTreeSet<String> =
            entries.iter().map(|e| e.account_id.clone()).collect();
        let _guards = self.acquire_locks(&account_ids).await?;

        // Validate everything before touching balances, so a failure leaves
        // no partial postings behind
        {
            let accounts = self.accounts.read().unwrap();
            let mut projected: HashMap<&str, i64> = HashMap::new();
            for entry in entries {
                let account = accounts
                    .get(&entry.account_id)
                    .ok_or_else(|| LedgerError::AccountNotFound(entry.account_id.clone()))?;
                if account.status == AccountStatus::Closed {
                    return Err(LedgerError::Validation(format!(
                        "account '{}' is closed",
                        entry.account_id
                    )));
                }
                let balance = projected
                    .entry(entry.account_id.as_str())
                    .or_insert(account.balance);
                *balance += entry.amount;
                if *balance < account.min_balance {
                    return Err(LedgerError::InsufficientFunds {
                        account_id: entry.account_id.clone(),
                        requested: -entry.amount,
                        available: account.available(),
                    });
                }
            }
        }

        // Apply postings and balance updates as one atomic unit: both maps
        // are written while holding the per-account locks, and balance
        // writes happen under a single write lock
        let now = Utc::now();
        let mut committed = Vec::with_capacity(entries.len());
        {
            let mut accounts = self.accounts.write().unwrap();
            let mut postings = self.postings.write().unwrap();
            for entry in entries {
                let account = accounts
                    .get_mut(&entry.account_id)
                    .ok_or_else(|| LedgerError::AccountNotFound(entry.account_id.clone()))?;
                account.balance += entry.amount;
                account.version += 1;
                account.updated_at = now;
                let posting = Posting {
                    id: Uuid::new_v4().to_string(),
                    transaction_id: transaction_id.to_string(),
                    account_id: entry.account_id.clone(),
                    amount: entry.amount,
                    balance_after: account.balance,
                    kind: entry.kind,
                    created_at: now,
                };
                postings.push(posting.clone());
                committed.push(posting);
            }
        }

        Ok(committed)
    }

    async fn get_balance(&self, account_id: &str) -> LedgerResult<i64> {
        let accounts = self.accounts.read().unwrap();
        accounts
            .get(account_id)
            .map(|a| a.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    async fn statement(
        &self,
        account_id: &str,
        range: StatementRange,
    ) -> LedgerResult<Vec<Posting>> {
        let postings = self.postings.read().unwrap();
        let mut matching: Vec<Posting> = postings
            .iter()
            .filter(|p| p.account_id == account_id && range.contains(p.created_at))
            .cloned()
            .collect();
        matching.sort_by_key(|p| p.created_at);
        Ok(matching)
    }

    async fn postings_for(&self, transaction_id: &str) -> LedgerResult<Vec<Posting>> {
        let postings = self.postings.read().unwrap();
        Ok(postings
            .iter()
            .filter(|p| p.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn save_transaction(&self, transaction: &Transaction) -> LedgerResult<()> {
        let mut transactions = self.transactions.write().unwrap();
        if transactions.contains_key(&transaction.id) {
            return Err(LedgerError::Storage(format!(
                "transaction '{}' already exists",
                transaction.id
            )));
        }
        transactions.insert(transaction.id.clone(), transaction.clone());
        self.idempotency
            .write()
            .unwrap()
            .insert(transaction.idempotency_key.clone(), transaction.id.clone());
        Ok(())
    }

    async fn update_transaction(&self, transaction: &Transaction) -> LedgerResult<()> {
        let mut transactions = self.transactions.write().unwrap();
        if !transactions.contains_key(&transaction.id) {
            return Err(LedgerError::TransactionNotFound(transaction.id.clone()));
        }
        transactions.insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .get(transaction_id)
            .cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> LedgerResult<Option<Transaction>> {
        let transaction_id = match self.idempotency.read().unwrap().get(key) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        self.get_transaction(&transaction_id).await
    }

    async fn clear_idempotency_key(&self, key: &str) -> LedgerResult<()> {
        self.idempotency.write().unwrap().remove(key);
        Ok(())
    }

    async fn save_loan(&self, loan: &Loan) -> LedgerResult<()> {
        self.loans
            .write()
            .unwrap()
            .insert(loan.loan_id.clone(), loan.clone());
        Ok(())
    }

    async fn get_loan(&self, loan_id: &str) -> LedgerResult<Option<Loan>> {
        Ok(self.loans.read().unwrap().get(loan_id).cloned())
    }

    async fn update_loan(&self, loan: &Loan) -> LedgerResult<()> {
        let mut loans = self.loans.write().unwrap();
        if !loans.contains_key(&loan.loan_id) {
            return Err(LedgerError::Storage(format!(
                "loan '{}' not found",
                loan.loan_id
            )));
        }
        loans.insert(loan.loan_id.clone(), loan.clone());
        Ok(())
    }

    async fn loans_for_borrower(&self, borrower: &str) -> LedgerResult<Vec<Loan>> {
        let loans = self.loans.read().unwrap();
        Ok(loans
            .values()
            .filter(|l| l.borrower == borrower)
            .cloned()
            .collect())
    }

    async fn save_repayment(&self, repayment: &LoanRepayment) -> LedgerResult<()> {
        self.repayments.write().unwrap().push(repayment.clone());
        Ok(())
    }

    async fn repayments_for_loan(&self, loan_id: &str) -> LedgerResult<Vec<LoanRepayment>> {
        let repayments = self.repayments.read().unwrap();
        Ok(repayments
            .iter()
            .filter(|r| r.loan_id == loan_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str) -> Account {
        Account::new(
            id.to_string(),
            format!("owner-{id}"),
            AccountKind::CustomerWallet,
        )
    }

    /// Balances are seeded through the posting path, not by assignment
    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_account(&account("A")).await.unwrap();
        store.create_account(&account("B")).await.unwrap();
        let mut funding = Account::new("SYS".to_string(), "system".to_string(), AccountKind::System);
        funding.min_balance = i64::MIN;
        store.create_account(&funding).await.unwrap();
        store
            .post(
                "SEED",
                &[
                    PostingEntry::new("SYS".to_string(), -10_000, PostingKind::Debit),
                    PostingEntry::new("A".to_string(), 10_000, PostingKind::Credit),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_post_applies_all_or_nothing() {
        let store = seeded_store().await;

        // B has nothing; the debit against B must fail the whole group
        let err = store
            .post(
                "T1",
                &[
                    PostingEntry::new("B".to_string(), -5_000, PostingKind::Debit),
                    PostingEntry::new("A".to_string(), 5_000, PostingKind::Credit),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        assert_eq!(store.get_balance("A").await.unwrap(), 10_000);
        assert_eq!(store.get_balance("B").await.unwrap(), 0);
        assert!(store.postings_for("T1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_rejects_unbalanced_group() {
        let store = seeded_store().await;

        let err = store
            .post(
                "T1",
                &[
                    PostingEntry::new("A".to_string(), -1_000, PostingKind::Debit),
                    PostingEntry::new("B".to_string(), 900, PostingKind::Credit),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnbalancedPostings { .. }));
    }

    #[tokio::test]
    async fn test_balance_after_snapshots_are_sequential() {
        let store = seeded_store().await;

        let postings = store
            .post(
                "T1",
                &[
                    PostingEntry::new("A".to_string(), -4_000, PostingKind::Debit),
                    PostingEntry::new("B".to_string(), 4_000, PostingKind::Credit),
                ],
            )
            .await
            .unwrap();

        assert_eq!(postings[0].balance_after, 6_000);
        assert_eq!(postings[1].balance_after, 4_000);
    }

    #[tokio::test]
    async fn test_opposing_transfers_complete_without_deadlock() {
        let store = Arc::new(seeded_store().await);
        store
            .post(
                "SEED2",
                &[
                    PostingEntry::new("SYS".to_string(), -10_000, PostingKind::Debit),
                    PostingEntry::new("B".to_string(), 10_000, PostingKind::Credit),
                ],
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let (from, to) = if i % 2 == 0 { ("A", "B") } else { ("B", "A") };
            handles.push(tokio::spawn(async move {
                store
                    .post(
                        &format!("T{i}"),
                        &[
                            PostingEntry::new(from.to_string(), -100, PostingKind::Debit),
                            PostingEntry::new(to.to_string(), 100, PostingKind::Credit),
                        ],
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let total =
            store.get_balance("A").await.unwrap() + store.get_balance("B").await.unwrap();
        assert_eq!(total, 20_000);
    }

    #[tokio::test]
    async fn test_update_account_does_not_touch_balance() {
        let store = seeded_store().await;

        let mut account = store.get_account("A").await.unwrap().unwrap();
        account.balance = 999_999;
        account.status = AccountStatus::Suspended;
        store.update_account(&account).await.unwrap();

        let reloaded = store.get_account("A").await.unwrap().unwrap();
        assert_eq!(reloaded.status, AccountStatus::Suspended);
        assert_eq!(reloaded.balance, 10_000);
    }
}
