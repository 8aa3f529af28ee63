//! Account management functionality

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::ledger::posting::patterns;
use crate::traits::LedgerStore;
use crate::types::*;
use crate::utils::validation::{validate_account_id, validate_owner};

/// Maximum parent hops in the super-agent float hierarchy
pub const FLOAT_HIERARCHY_DEPTH: usize = 3;

/// The system accounts the engine posts against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAccounts {
    /// Receives all transaction charges
    pub charge_collection: String,
    /// Funds all commission payouts
    pub commission_funding: String,
    /// Absorbs redeemed e-value and float drawdown on cash-out
    pub cash_out_settlement: String,
    /// Receives airtime purchase value for the network operators
    pub airtime_clearing: String,
    /// Source and sink of loan principal and repayments
    pub loan_funding: String,
}

impl Default for SystemAccounts {
    fn default() -> Self {
        Self {
            charge_collection: "SYS_CHARGES".to_string(),
            commission_funding: "SYS_COMMISSION".to_string(),
            cash_out_settlement: "SYS_CASHOUT".to_string(),
            airtime_clearing: "SYS_AIRTIME".to_string(),
            loan_funding: "SYS_LOANS".to_string(),
        }
    }
}

impl SystemAccounts {
    fn ids(&self) -> [&str; 5] {
        [
            &self.charge_collection,
            &self.commission_funding,
            &self.cash_out_settlement,
            &self.airtime_clearing,
            &self.loan_funding,
        ]
    }
}

/// Parameters for opening an account
#[derive(Debug, Clone)]
pub struct OpenAccount {
    pub id: String,
    pub owner: String,
    pub kind: AccountKind,
    /// Parent float in the super-agent hierarchy; floats only
    pub parent_id: Option<String>,
    /// Override for the balance floor; must not be positive
    pub min_balance: Option<i64>,
    pub daily_limit: Option<i64>,
    pub monthly_limit: Option<i64>,
}

impl OpenAccount {
    pub fn new(id: String, owner: String, kind: AccountKind) -> Self {
        Self {
            id,
            owner,
            kind,
            parent_id: None,
            min_balance: None,
            daily_limit: None,
            monthly_limit: None,
        }
    }

    /// Set a negative floor for a credit-backed float
    pub fn with_floor(mut self, min_balance: i64) -> Self {
        self.min_balance = Some(min_balance);
        self
    }

    pub fn with_parent(mut self, parent_id: String) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_limits(mut self, daily: i64, monthly: i64) -> Self {
        self.daily_limit = Some(daily);
        self.monthly_limit = Some(monthly);
        self
    }
}

/// Account manager for opening accounts and managing their lifecycle
pub struct AccountManager<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> AccountManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Open a new account
    pub async fn open(&self, params: OpenAccount) -> LedgerResult<Account> {
        validate_account_id(&params.id)?;
        validate_owner(&params.owner)?;

        if self.store.get_account(&params.id).await?.is_some() {
            return Err(LedgerError::Validation(format!(
                "account with id '{}' already exists",
                params.id
            )));
        }

        if let Some(floor) = params.min_balance {
            if floor > 0 {
                return Err(LedgerError::Validation(
                    "account floor must not be positive".to_string(),
                ));
            }
            if params.kind != AccountKind::AgentFloat && floor < 0 {
                return Err(LedgerError::Validation(
                    "only agent float accounts may carry a negative floor".to_string(),
                ));
            }
        }

        if let Some(ref parent_id) = params.parent_id {
            if params.kind != AccountKind::AgentFloat {
                return Err(LedgerError::Validation(
                    "only float accounts participate in the float hierarchy".to_string(),
                ));
            }
            let parent = self
                .store
                .get_account(parent_id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(parent_id.clone()))?;
            if parent.kind != AccountKind::AgentFloat {
                return Err(LedgerError::Validation(format!(
                    "parent account '{}' is not a float account",
                    parent_id
                )));
            }
        }

        let mut account = Account::new(params.id, params.owner, params.kind);
        account.parent_id = params.parent_id;
        if let Some(floor) = params.min_balance {
            account.min_balance = floor;
        }
        if let Some(daily) = params.daily_limit {
            account.daily_limit = daily;
        }
        if let Some(monthly) = params.monthly_limit {
            account.monthly_limit = monthly;
        }

        self.store.create_account(&account).await?;
        info!(account_id = %account.id, kind = ?account.kind, "account opened");
        Ok(account)
    }

    /// Get an account by id
    pub async fn get(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.store.get_account(account_id).await
    }

    /// Get an account by id, returning an error if not found
    pub async fn get_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// List accounts, optionally by kind
    pub async fn list(&self, kind: Option<AccountKind>) -> LedgerResult<Vec<Account>> {
        self.store.list_accounts(kind).await
    }

    /// Suspend an active account
    pub async fn suspend(&self, account_id: &str) -> LedgerResult<Account> {
        self.set_status(account_id, AccountStatus::Active, AccountStatus::Suspended)
            .await
    }

    /// Reactivate a suspended account
    pub async fn reactivate(&self, account_id: &str) -> LedgerResult<Account> {
        self.set_status(account_id, AccountStatus::Suspended, AccountStatus::Active)
            .await
    }

    /// Close an account; requires a zero balance so no value is stranded
    pub async fn close(&self, account_id: &str) -> LedgerResult<Account> {
        let mut account = self.get_required(account_id).await?;
        if account.status == AccountStatus::Closed {
            return Err(LedgerError::Validation(format!(
                "account '{}' is already closed",
                account_id
            )));
        }
        if account.balance != 0 {
            return Err(LedgerError::Validation(format!(
                "account '{}' has a non-zero balance and cannot be closed",
                account_id
            )));
        }
        account.status = AccountStatus::Closed;
        account.updated_at = chrono::Utc::now();
        self.store.update_account(&account).await?;
        info!(account_id, "account closed");
        Ok(account)
    }

    /// The float hierarchy above an account, nearest parent first.
    ///
    /// Traversal is bounded to [`FLOAT_HIERARCHY_DEPTH`] hops; a longer
    /// chain (or a cycle) is a validation error.
    pub async fn float_chain(&self, account_id: &str) -> LedgerResult<Vec<Account>> {
        let mut chain = Vec::new();
        let mut current = self.get_required(account_id).await?.parent_id;

        while let Some(parent_id) = current {
            if chain.len() >= FLOAT_HIERARCHY_DEPTH {
                return Err(LedgerError::Validation(format!(
                    "float hierarchy above '{}' exceeds {} levels",
                    account_id, FLOAT_HIERARCHY_DEPTH
                )));
            }
            let parent = self.get_required(&parent_id).await?;
            current = parent.parent_id.clone();
            chain.push(parent);
        }

        Ok(chain)
    }

    /// Move float from an agent's parent down to the agent.
    ///
    /// A treasury-side transfer: it does not create a `Transaction` row,
    /// only a zero-sum posting pair, and fails if the parent float cannot
    /// cover the amount.
    pub async fn replenish_float(&self, float_id: &str, amount: i64) -> LedgerResult<Vec<Posting>> {
        if amount <= 0 {
            return Err(LedgerError::Validation(
                "replenishment amount must be positive".to_string(),
            ));
        }
        let float = self.get_required(float_id).await?;
        if float.kind != AccountKind::AgentFloat {
            return Err(LedgerError::Validation(format!(
                "account '{}' is not a float account",
                float_id
            )));
        }
        let parent_id = float.parent_id.clone().ok_or_else(|| {
            LedgerError::Validation(format!("float '{}' has no parent to draw from", float_id))
        })?;

        let transfer_id = format!(
            "FT{}",
            Uuid::new_v4().simple().to_string()[..12].to_uppercase()
        );
        let entries = patterns::transfer(&transfer_id, &parent_id, float_id, amount)?;
        let postings = self.store.post(&transfer_id, &entries).await?;
        info!(float_id, parent_id = %parent_id, amount, "float replenished");
        Ok(postings)
    }

    async fn set_status(
        &self,
        account_id: &str,
        expected: AccountStatus,
        next: AccountStatus,
    ) -> LedgerResult<Account> {
        let mut account = self.get_required(account_id).await?;
        if account.status != expected {
            return Err(LedgerError::Validation(format!(
                "account '{}' is {:?}, expected {:?}",
                account_id, account.status, expected
            )));
        }
        account.status = next;
        account.updated_at = chrono::Utc::now();
        self.store.update_account(&account).await?;
        Ok(account)
    }
}

/// Utility functions for bootstrapping a ledger
pub mod utils {
    use super::*;

    /// Create the five system accounts the engine needs, with unbounded
    /// floors and limits
    pub async fn create_system_accounts<S: LedgerStore>(
        manager: &AccountManager<S>,
        accounts: &SystemAccounts,
    ) -> LedgerResult<()> {
        for id in accounts.ids() {
            manager
                .open(OpenAccount::new(
                    id.to_string(),
                    "system".to_string(),
                    AccountKind::System,
                ))
                .await?;
        }
        Ok(())
    }
}
