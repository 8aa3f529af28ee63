//! Core types and data structures for the wallet ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default daily debit limit for non-system accounts, in minor units
/// (150,000.00 in major units).
pub const DEFAULT_DAILY_LIMIT: i64 = 15_000_000;

/// Default monthly debit limit for non-system accounts, in minor units
/// (500,000.00 in major units).
pub const DEFAULT_MONTHLY_LIMIT: i64 = 50_000_000;

/// Account kinds in the wallet ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    /// A customer's e-money wallet
    CustomerWallet,
    /// An agent's pre-funded float, used to service cash deposits and
    /// withdrawals; may carry a configured negative floor when the float
    /// is credit-backed
    AgentFloat,
    /// A merchant's settlement account (PayBill / Till receipts)
    MerchantSettlement,
    /// Internal system accounts: charge collection, commission funding,
    /// cash-out settlement, airtime clearing, loan funding
    System,
}

impl AccountKind {
    /// Minimum committed balance allowed for a fresh account of this kind.
    pub fn default_floor(&self) -> i64 {
        match self {
            AccountKind::System => i64::MIN,
            _ => 0,
        }
    }

    /// Default rolling debit limits for a fresh account of this kind.
    pub fn default_limits(&self) -> (i64, i64) {
        match self {
            AccountKind::System => (i64::MAX, i64::MAX),
            _ => (DEFAULT_DAILY_LIMIT, DEFAULT_MONTHLY_LIMIT),
        }
    }
}

/// Lifecycle status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

/// One wallet, float, settlement, or system account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: String,
    /// Reference to the owning party (customer, agent, merchant, or "system")
    pub owner: String,
    /// Kind of account
    pub kind: AccountKind,
    /// Lifecycle status
    pub status: AccountStatus,
    /// Current balance in minor currency units
    pub balance: i64,
    /// Lowest committed balance this account may reach; 0 for wallets and
    /// settlement accounts, possibly negative for credit-backed float
    pub min_balance: i64,
    /// Rolling daily debit cap in minor units
    pub daily_limit: i64,
    /// Rolling monthly debit cap in minor units
    pub monthly_limit: i64,
    /// Parent account in the super-agent float hierarchy
    pub parent_id: Option<String>,
    /// Bumped on every committed change; relational backends can use it
    /// for optimistic concurrency control
    pub version: u64,
    /// When the account was created
    pub created_at: DateTime<Utc>,
    /// When the account was last updated
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account with kind-default floor and limits
    pub fn new(id: String, owner: String, kind: AccountKind) -> Self {
        let now = Utc::now();
        let (daily_limit, monthly_limit) = kind.default_limits();
        Self {
            id,
            owner,
            kind,
            status: AccountStatus::Active,
            balance: 0,
            min_balance: kind.default_floor(),
            daily_limit,
            monthly_limit,
            parent_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance available for debiting above the account's floor.
    ///
    /// Saturating, since system accounts carry an `i64::MIN` floor.
    pub fn available(&self) -> i64 {
        self.balance.saturating_sub(self.min_balance)
    }
}

/// Role of the counterparty that mediates a transaction, used to select
/// the applicable commission rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommissionRole {
    Agent,
    Merchant,
}

/// User-initiated operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    SendMoney,
    Withdraw,
    Deposit,
    PayBill,
    BuyGoods,
    Airtime,
    LoanDisbursement,
    LoanRepayment,
}

impl TransactionType {
    /// Prefix used when generating transaction ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            TransactionType::SendMoney => "SM",
            TransactionType::Withdraw => "WD",
            TransactionType::Deposit => "DP",
            TransactionType::PayBill => "PB",
            TransactionType::BuyGoods => "BG",
            TransactionType::Airtime => "AT",
            TransactionType::LoanDisbursement => "LD",
            TransactionType::LoanRepayment => "LR",
        }
    }

    /// Whether a tiered transaction charge applies to this type.
    ///
    /// Deposits, airtime, and loan flows carry no customer charge; for the
    /// chargeable types an amount outside every configured tier is a
    /// configuration error, never a free transaction.
    pub fn is_chargeable(&self) -> bool {
        matches!(
            self,
            TransactionType::SendMoney
                | TransactionType::Withdraw
                | TransactionType::PayBill
                | TransactionType::BuyGoods
        )
    }

    /// The counterparty role that earns commission on this type, if any
    pub fn commission_role(&self) -> Option<CommissionRole> {
        match self {
            TransactionType::Withdraw | TransactionType::Deposit => Some(CommissionRole::Agent),
            TransactionType::PayBill | TransactionType::BuyGoods => Some(CommissionRole::Merchant),
            _ => None,
        }
    }
}

/// Status of a transaction as it moves through the engine
///
/// `Failed` is reachable from any non-terminal state; `Reversed` only from
/// `Completed`, and only through the reversal processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Created,
    Validated,
    Locked,
    Posted,
    CommissionApplied,
    Completed,
    Failed,
    Reversed,
}

impl TransactionStatus {
    /// Whether no further engine-driven transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Reversed
        )
    }
}

/// One user-initiated operation; append-only audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier, e.g. "SM20240101120000A1B2C3"
    pub id: String,
    /// Operation kind
    pub tx_type: TransactionType,
    /// Account debited for the amount (plus charge, where applicable)
    pub initiator: String,
    /// Account credited with the amount
    pub counterparty: String,
    /// Requested amount in minor units
    pub amount: i64,
    /// Charge computed for this transaction, in minor units
    pub charge: i64,
    /// Current status
    pub status: TransactionStatus,
    /// Reason recorded when the transaction failed
    pub failure_reason: Option<String>,
    /// Caller-supplied token making retried requests safe
    pub idempotency_key: String,
    /// Human-readable context, e.g. the operator's reversal reason
    pub description: Option<String>,
    /// Set on a reversal transaction: the id of the transaction it negates
    pub reversal_of: Option<String>,
    /// Set on a reversed transaction: the id of the reversal that negated it
    pub reversed_by: Option<String>,
    /// When the transaction was created
    pub created_at: DateTime<Utc>,
    /// When the transaction reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Generate a transaction id in the scheme `<prefix><timestamp><suffix>`
    pub fn generate_id(tx_type: TransactionType) -> String {
        Self::generate_id_with_prefix(tx_type.id_prefix())
    }

    /// Generate an id under an explicit prefix (reversals use "RV")
    pub fn generate_id_with_prefix(prefix: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}{}{}",
            prefix,
            Utc::now().format("%Y%m%d%H%M%S"),
            suffix[..6].to_uppercase()
        )
    }

    /// Total debit against the initiator (amount plus charge)
    pub fn total_debit(&self) -> i64 {
        self.amount + self.charge
    }
}

/// Kind of a single ledger posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingKind {
    Debit,
    Credit,
    Charge,
    Commission,
}

/// One signed movement to apply against one account, before it is
/// committed by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingEntry {
    /// Account being affected
    pub account_id: String,
    /// Signed amount in minor units; negative debits, positive credits
    pub amount: i64,
    /// Kind of posting
    pub kind: PostingKind,
}

impl PostingEntry {
    pub fn new(account_id: String, amount: i64, kind: PostingKind) -> Self {
        Self {
            account_id,
            amount,
            kind,
        }
    }
}

/// One immutable, committed ledger movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    /// Unique identifier for the posting
    pub id: String,
    /// Transaction this posting belongs to; all postings sharing a
    /// transaction id sum to zero
    pub transaction_id: String,
    /// Account affected
    pub account_id: String,
    /// Signed amount in minor units
    pub amount: i64,
    /// Account balance immediately after this posting was applied
    pub balance_after: i64,
    /// Kind of posting
    pub kind: PostingKind,
    /// When the posting was committed
    pub created_at: DateTime<Utc>,
}

/// Inclusive filter over a statement query; `None` bounds are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl StatementRange {
    /// Whether a timestamp falls inside the range
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if at > to {
                return false;
            }
        }
        true
    }
}

/// Inbound request for the transaction engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub tx_type: TransactionType,
    /// Account debited for the amount (plus charge, where applicable)
    pub initiator: String,
    /// Account credited with the amount
    pub counterparty: String,
    /// Requested amount in minor units; must be positive
    pub amount: i64,
    /// Caller-supplied token; retries with the same key return the first
    /// execution's result
    pub idempotency_key: String,
}

/// Outcome of a completed engine operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Final transaction row
    pub transaction: Transaction,
    /// Postings committed for the transaction, in application order
    pub postings: Vec<Posting>,
}

/// Event emitted at transaction completion for an external notification
/// collaborator to deliver; the engine never delivers anything itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub account_id: String,
    pub tx_type: TransactionType,
    /// Signed amount the account moved by, in minor units
    pub amount: i64,
    /// Account balance after the transaction, in minor units
    pub balance: i64,
    pub timestamp: DateTime<Utc>,
}

/// Which rolling limit window a breach occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitScope {
    Daily,
    Monthly,
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitScope::Daily => write!(f, "daily"),
            LimitScope::Monthly => write!(f, "monthly"),
        }
    }
}

/// Errors that can occur in the wallet ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error(
        "Insufficient funds in account '{account_id}': requested {requested}, available {available}"
    )]
    InsufficientFunds {
        account_id: String,
        requested: i64,
        available: i64,
    },
    #[error("{scope} limit {limit} exceeded: attempted total {attempted}")]
    LimitExceeded {
        scope: LimitScope,
        limit: i64,
        attempted: i64,
    },
    #[error("Ledger conflict: {0}")]
    LedgerConflict(String),
    #[error("No charge tier configured for {tx_type:?} amount {amount}")]
    NoTierConfigured { tx_type: TransactionType, amount: i64 },
    #[error("No commission rule configured for {tx_type:?} role {role:?}")]
    CommissionRuleMissing {
        tx_type: TransactionType,
        role: CommissionRole,
    },
    #[error("Reversal window expired for transaction '{transaction_id}'")]
    ReversalWindowExpired { transaction_id: String },
    #[error("Transaction already reversed: {0}")]
    AlreadyReversed(String),
    #[error("Postings for transaction '{transaction_id}' do not sum to zero (net {net})")]
    UnbalancedPostings { transaction_id: String, net: i64 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LedgerError {
    /// Whether the caller may safely retry the operation with the same
    /// idempotency key
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::LedgerConflict(_))
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
