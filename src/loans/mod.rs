//! Loan products, disbursement, and repayment
//!
//! Loans follow the same posting discipline as every other flow:
//! disbursement moves principal from the loan funding account into the
//! borrower's wallet, repayment moves it back. Interest is computed once
//! at origination from the product's daily rate; scheduled re-accrual is a
//! batch concern outside the core transaction path.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ledger::TransactionEngine;
use crate::traits::LedgerStore;
use crate::types::*;

/// Days in the interest year
const DAYS_PER_YEAR: i64 = 365;

/// Lifecycle status of a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    Pending,
    Disbursed,
    Active,
    Paid,
    Defaulted,
    Rejected,
}

impl LoanStatus {
    /// Whether the loan still holds or expects outstanding value
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            LoanStatus::Pending | LoanStatus::Disbursed | LoanStatus::Active
        )
    }
}

/// An offered loan product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanProduct {
    pub id: String,
    pub name: String,
    /// Smallest principal in minor units
    pub min_amount: i64,
    /// Largest principal in minor units
    pub max_amount: i64,
    /// Annual interest rate in basis points
    pub annual_rate_bps: u32,
    /// Term length in days
    pub duration_days: i64,
    /// Flat origination fee in minor units
    pub facilitation_fee: i64,
}

impl LoanProduct {
    /// Interest in minor units for a principal over the product's term.
    ///
    /// Daily-rate formula with floor division:
    /// `principal * rate_bps * days / (365 * 10_000)`.
    pub fn interest_for(&self, principal: i64) -> i64 {
        let numerator =
            i128::from(principal) * i128::from(self.annual_rate_bps) * i128::from(self.duration_days);
        (numerator / (i128::from(DAYS_PER_YEAR) * 10_000)) as i64
    }
}

/// One customer loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: String,
    /// The borrower's wallet account
    pub borrower: String,
    pub product_id: String,
    pub principal: i64,
    pub interest: i64,
    pub facilitation_fee: i64,
    /// Principal plus interest plus fee
    pub total: i64,
    pub amount_paid: i64,
    /// Outstanding amount still owed
    pub balance: i64,
    pub status: LoanStatus,
    pub due_date: NaiveDate,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One repayment audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRepayment {
    pub loan_id: String,
    pub transaction_id: String,
    pub amount: i64,
    /// Loan balance before this repayment
    pub balance_before: i64,
    /// Loan balance after this repayment
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Manages loan origination, disbursement, and repayment
pub struct LoanManager<S: LedgerStore> {
    store: Arc<S>,
    engine: Arc<TransactionEngine<S>>,
    products: RwLock<HashMap<String, LoanProduct>>,
}

impl<S: LedgerStore> LoanManager<S> {
    pub fn new(store: Arc<S>, engine: Arc<TransactionEngine<S>>) -> Self {
        Self {
            store,
            engine,
            products: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace a loan product
    pub fn register_product(&self, product: LoanProduct) -> LedgerResult<()> {
        if product.min_amount <= 0 || product.max_amount < product.min_amount {
            return Err(LedgerError::InvalidConfig(format!(
                "invalid principal range [{}, {}] for product '{}'",
                product.min_amount, product.max_amount, product.id
            )));
        }
        if product.duration_days <= 0 {
            return Err(LedgerError::InvalidConfig(format!(
                "non-positive duration for product '{}'",
                product.id
            )));
        }
        self.products
            .write()
            .expect("loan products poisoned")
            .insert(product.id.clone(), product);
        Ok(())
    }

    /// Look up a registered product
    pub fn product(&self, product_id: &str) -> Option<LoanProduct> {
        self.products
            .read()
            .expect("loan products poisoned")
            .get(product_id)
            .cloned()
    }

    /// Apply for a loan.
    ///
    /// The principal must lie in the product's range and the borrower must
    /// not already hold an open loan (the original one-loan-at-a-time
    /// rule).
    pub async fn apply(
        &self,
        borrower: &str,
        product_id: &str,
        principal: i64,
    ) -> LedgerResult<Loan> {
        let product = self.product(product_id).ok_or_else(|| {
            LedgerError::Validation(format!("loan product '{}' not found", product_id))
        })?;
        if principal < product.min_amount || principal > product.max_amount {
            return Err(LedgerError::Validation(format!(
                "principal must be between {} and {}",
                product.min_amount, product.max_amount
            )));
        }

        let open = self
            .store
            .loans_for_borrower(borrower)
            .await?
            .into_iter()
            .any(|l| l.status.is_open());
        if open {
            return Err(LedgerError::Validation(
                "borrower already has an open loan".to_string(),
            ));
        }

        let now = Utc::now();
        let interest = product.interest_for(principal);
        let total = principal + interest + product.facilitation_fee;
        let loan = Loan {
            loan_id: Transaction::generate_id_with_prefix("LN"),
            borrower: borrower.to_string(),
            product_id: product.id.clone(),
            principal,
            interest,
            facilitation_fee: product.facilitation_fee,
            total,
            amount_paid: 0,
            balance: total,
            status: LoanStatus::Pending,
            due_date: (now + Duration::days(product.duration_days)).date_naive(),
            disbursed_at: None,
            created_at: now,
        };
        self.store.save_loan(&loan).await?;
        info!(loan_id = %loan.loan_id, borrower, principal, "loan application recorded");
        Ok(loan)
    }

    /// Disburse a pending loan's principal into the borrower's wallet.
    ///
    /// Exactly-once per loan: the underlying transaction's idempotency key
    /// is derived from the loan id.
    pub async fn disburse(&self, loan_id: &str) -> LedgerResult<(Loan, TransactionResult)> {
        let mut loan = self.get_required(loan_id).await?;
        if loan.status != LoanStatus::Pending {
            return Err(LedgerError::Validation(format!(
                "loan '{}' is {:?}, not pending",
                loan_id, loan.status
            )));
        }

        let result = self
            .engine
            .execute(TransactionRequest {
                tx_type: TransactionType::LoanDisbursement,
                initiator: self.engine.system_accounts().loan_funding.clone(),
                counterparty: loan.borrower.clone(),
                amount: loan.principal,
                idempotency_key: format!("{}:disburse", loan.loan_id),
            })
            .await?;

        loan.status = LoanStatus::Disbursed;
        loan.disbursed_at = Some(Utc::now());
        self.store.update_loan(&loan).await?;
        info!(loan_id, principal = loan.principal, "loan disbursed");
        Ok((loan, result))
    }

    /// Repay part or all of an outstanding loan.
    ///
    /// An amount above the outstanding balance is clamped to it, as the
    /// original service does.
    pub async fn repay(
        &self,
        loan_id: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<(Loan, LoanRepayment)> {
        if amount <= 0 {
            return Err(LedgerError::Validation(
                "repayment amount must be positive".to_string(),
            ));
        }
        let mut loan = self.get_required(loan_id).await?;
        if !matches!(loan.status, LoanStatus::Disbursed | LoanStatus::Active) {
            return Err(LedgerError::Validation(format!(
                "loan '{}' is {:?}, not active",
                loan_id, loan.status
            )));
        }

        let amount = amount.min(loan.balance);
        let result = self
            .engine
            .execute(TransactionRequest {
                tx_type: TransactionType::LoanRepayment,
                initiator: loan.borrower.clone(),
                counterparty: self.engine.system_accounts().loan_funding.clone(),
                amount,
                idempotency_key: idempotency_key.to_string(),
            })
            .await?;

        let balance_before = loan.balance;
        loan.amount_paid += amount;
        loan.balance -= amount;
        loan.status = if loan.balance == 0 {
            LoanStatus::Paid
        } else {
            LoanStatus::Active
        };
        self.store.update_loan(&loan).await?;

        let repayment = LoanRepayment {
            loan_id: loan.loan_id.clone(),
            transaction_id: result.transaction.id.clone(),
            amount,
            balance_before,
            balance_after: loan.balance,
            created_at: Utc::now(),
        };
        self.store.save_repayment(&repayment).await?;
        info!(loan_id, amount, outstanding = loan.balance, "loan repayment recorded");
        Ok((loan, repayment))
    }

    /// Repayment history for a loan, oldest first
    pub async fn repayments(&self, loan_id: &str) -> LedgerResult<Vec<LoanRepayment>> {
        self.store.repayments_for_loan(loan_id).await
    }

    async fn get_required(&self, loan_id: &str) -> LedgerResult<Loan> {
        self.store
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| LedgerError::Validation(format!("loan '{}' not found", loan_id)))
    }
}
